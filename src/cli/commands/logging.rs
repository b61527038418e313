use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("RECINTO_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::validator_log_level;

    fn parse(value: &str) -> Option<u8> {
        let cmd = clap::Command::new("test")
            .arg(clap::Arg::new("verbosity").value_parser(validator_log_level()));
        cmd.try_get_matches_from(vec!["test", value])
            .ok()
            .and_then(|matches| matches.get_one::<u8>("verbosity").copied())
    }

    #[test]
    fn log_level_names_map_to_counts() {
        assert_eq!(parse("error"), Some(0));
        assert_eq!(parse("WARN"), Some(1));
        assert_eq!(parse("info"), Some(2));
        assert_eq!(parse("debug"), Some(3));
        assert_eq!(parse("trace"), Some(4));
    }

    #[test]
    fn log_level_numbers_pass_through() {
        assert_eq!(parse("0"), Some(0));
        assert_eq!(parse("3"), Some(3));
        assert_eq!(parse("5"), Some(5));
    }

    #[test]
    fn log_level_rejects_garbage() {
        assert_eq!(parse("nope"), None);
        assert_eq!(parse("42"), None);
    }
}
