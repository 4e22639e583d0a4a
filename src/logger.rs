use crate::{args::Args, MainError};
use log::{warn, Level, LevelFilter};
use simplelog::{
    format_description, Color, ColorChoice, CombinedLogger, ConfigBuilder, LevelPadding,
    TermLogger, TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;

// Use the same format as simple_logger
const TIMESTAMP_FORMAT_OFFSET: &[simplelog::FormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory]:[offset_minute]"
);

/// Log to the terminal and append to the log file. The log file only gets
/// the debug messages if `debug` is set.
pub fn init_logger(args: &Args, debug: bool) -> Result<(), MainError> {
    let config = ConfigBuilder::new()
        .set_level_color(Level::Debug, Some(Color::Magenta))
        .set_level_color(Level::Trace, None)
        .set_level_padding(LevelPadding::Right)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(TIMESTAMP_FORMAT_OFFSET)
        .set_time_offset_to_local()
        .map_err(|_| MainError::FailedLoggerTimezones)?
        .build();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .map_err(|err| MainError::FailedLogFile(args.log_file.clone(), err))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            match (args.quiet, args.verbose) {
                (true, _) => LevelFilter::Error,
                (false, 0) => LevelFilter::Info,
                (false, 1) => LevelFilter::Debug,
                (false, _) => LevelFilter::Trace,
            },
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            if debug {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            config,
            log_file,
        ),
    ])?;

    if args.verbose > 3 {
        warn!("Okay, it's time to stop. It won't get more verbose than this.")
    }

    Ok(())
}
