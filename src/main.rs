//! NavPlane orchestration server.
//!
//! By default this serves peers on `/ws` plus the HTTP chat surface.
//! `--mcp` additionally serves the tool catalog over MCP on stdio.

use navplane::config;
use navplane::errors::NavResult;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program}          serve peers and the HTTP chat API\n  {program} --mcp    same, plus MCP over stdio\n\nConfiguration is read from config.toml (next to the binary or in the working directory)."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    mcp: bool,
    help: bool,
}

fn parse_options(args: impl Iterator<Item = String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    for arg in args {
        match arg.as_str() {
            "--mcp" => options.mcp = true,
            "-h" | "--help" => options.help = true,
            other => return Err(other.to_string()),
        }
    }
    Ok(options)
}

fn main() -> NavResult<()> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "navplane".into());
    let options = match parse_options(args) {
        Ok(options) if options.help => {
            print_usage(&program);
            return Ok(());
        }
        Ok(options) => options,
        Err(arg) => {
            eprintln!("unknown argument: {arg}");
            print_usage(&program);
            std::process::exit(2);
        }
    };

    navplane::init_tracing();

    let cfg = config::load_config_or_default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = async {
            if options.mcp {
                navplane::server::run_mcp(cfg).await
            } else {
                navplane::server::run_server(cfg).await
            }
        };
        tokio::select! {
            result = server => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, String> {
        parse_options(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn mcp_flag_selects_stdio_mode() {
        assert_eq!(parse(&[]).unwrap(), CliOptions::default());
        assert!(parse(&["--mcp"]).unwrap().mcp);
        assert!(parse(&["--help"]).unwrap().help);
        assert_eq!(parse(&["--serve"]).unwrap_err(), "--serve");
    }
}
