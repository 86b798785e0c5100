use anyhow::Result;
use clap::Parser;
use tecs_cli::{main_inner, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    main_inner(args)
}
