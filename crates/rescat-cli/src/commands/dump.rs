use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use rescat::serialize;

use super::{output, Context};
use crate::cli::DumpArgs;

pub fn run(ctx: &Context, args: &DumpArgs) -> Result<ExitCode> {
    let collection = ctx.load(&args.load, ctx.hooks()?)?;
    let mut out = output(args.out.as_deref())?;
    out.write_all(serialize::write(&collection, args.format).as_bytes())?;
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}
