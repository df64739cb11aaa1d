use std::io::IsTerminal as _;

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

use crate::Args;

/// Directive enabling the per request snapshot logs,
/// without also turning on debug logs of the http stack.
const VERBOSE_DIRECTIVE: &str = "arb_testserver=debug";

/// Install the global tracing subscriber.
///
/// Logs at INFO by default. `--verbose` also logs every served snapshot.
/// `RUST_LOG` directives are applied on top of either.
pub fn init_tracing(args: &Args) -> Result<(), BoxError> {
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if args.verbose {
        env_filter = env_filter.add_directive(
            VERBOSE_DIRECTIVE
                .parse()
                .context("parse verbose tracing directive")?,
        );
    }

    let (make_writer, ansi) = match args.output.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .context("open log file")
                .with_context_debug_field("path", || path.to_owned())?;
            (BoxMakeWriter::new(file), false)
        }
        None => (
            BoxMakeWriter::new(std::io::stderr),
            std::io::stderr().is_terminal(),
        ),
    };

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(env_filter)
        .with_writer(make_writer);

    if args.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(
        verbose = args.verbose,
        pretty = args.pretty,
        log_file = ?args.output,
        "tracing initialized",
    );
    Ok(())
}
