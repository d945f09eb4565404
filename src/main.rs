use originserve::config::{display_config, load_config};
use originserve::error::{CleanError, Result};
use originserve::server::Server;
use originserve::signals;

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let path = parse_args()?;
    signals::install();

    let configs = load_config(&path)?;
    if configs.is_empty() {
        return Err(CleanError::from(format!(
            "{}: no valid server blocks remained after validation",
            path.display()
        )));
    }
    display_config(&configs);

    let mut server = Server::new(configs)?;
    server.run()
}

/// Validates argv per §10.3: exactly one positional argument, and it must
/// name a file ending in `.conf`.
fn parse_args() -> Result<std::path::PathBuf> {
    let mut args = std::env::args_os().skip(1);
    let Some(arg) = args.next() else {
        return Err(CleanError::from(
            "usage: originserve <config.conf>".to_string(),
        ));
    };
    if args.next().is_some() {
        return Err(CleanError::from(
            "usage: originserve <config.conf> (exactly one argument)".to_string(),
        ));
    }

    let path = std::path::PathBuf::from(arg);
    if path.extension().and_then(|e| e.to_str()) != Some("conf") {
        return Err(CleanError::from(format!(
            "{}: config file must have a .conf extension",
            path.display()
        )));
    }
    Ok(path)
}
