use std::process::ExitCode;

use anyhow::Result;
use rescat::env::{EnvReader, RealEnv};
use rescat::hooks::{CHECKERS_VAR, TRANSFORMS_VAR};

pub fn run() -> Result<ExitCode> {
    print!("{}", render(&RealEnv));
    Ok(ExitCode::SUCCESS)
}

fn render(env: &impl EnvReader) -> String {
    [TRANSFORMS_VAR, CHECKERS_VAR]
        .iter()
        .map(|name| {
            let value = env
                .var(name)
                .map(|v| shell_words::quote(&v).into_owned())
                .unwrap_or_else(|| "<not set>".to_string());
            format!("{}={}\n", name, value)
        })
        .collect()
}
