use iot_session::Role;
use std::fmt;

/// Console commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        role: Option<Role>,
        name: Option<String>,
    },
    Google,
    GoogleRedirect,
    Reset {
        email: String,
    },
    Logout,
    Status,
    /// Simulate a connectivity transition
    Online,
    Offline,
    /// Dismiss the error and success messages
    Clear,
    Help,
    Quit,
}

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Command given without its required arguments.
    MissingArguments { usage: &'static str },
    /// Role not assignable at registration.
    InvalidRole(String),
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArguments { usage } => write!(f, "Missing arguments. Usage: {}", usage),
            Self::InvalidRole(role) => write!(
                f,
                "Invalid role '{}'. Use 'integrator' or 'industrial_client'",
                role
            ),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Type 'help' to see available commands",
                cmd
            ),
        }
    }
}

impl std::error::Error for ParseError {}

pub const HELP_TEXT: &str = "\
Commands:
  login EMAIL PASSWORD
  register EMAIL PASSWORD [integrator|industrial_client] [NAME...]
  google                 Sign in with the Google popup
  google-redirect        Sign in with the Google redirect flow
  reset EMAIL            Send a password reset email
  logout
  status                 Show the session state
  online | offline       Simulate a connectivity change
  clear                  Dismiss messages
  help
  quit";

const LOGIN_USAGE: &str = "login EMAIL PASSWORD";
const REGISTER_USAGE: &str = "register EMAIL PASSWORD [ROLE] [NAME...]";
const RESET_USAGE: &str = "reset EMAIL";
const STARTUP_LOGIN_USAGE: &str = "--email EMAIL --password PASS";

/// Build the sign-in requested by the `--email` and `--password` flags.
///
/// Both flags or neither must be given.
pub fn startup_login(
    email: Option<String>,
    password: Option<String>,
) -> Result<Option<Command>, ParseError> {
    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(Command::Login { email, password })),
        (None, None) => Ok(None),
        _ => Err(ParseError::MissingArguments {
            usage: STARTUP_LOGIN_USAGE,
        }),
    }
}

/// Parse a line of console input.
///
/// # Examples
///
/// ```
/// use iot_console::commands::{Command, parse_command};
///
/// assert_eq!(parse_command("logout"), Ok(Command::Logout));
/// assert!(matches!(parse_command("login a@b.c secret"), Ok(Command::Login { .. })));
/// ```
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let trimmed = input.trim();

    match trimmed {
        "google" => return Ok(Command::Google),
        "google-redirect" => return Ok(Command::GoogleRedirect),
        "logout" => return Ok(Command::Logout),
        "status" | "" => return Ok(Command::Status),
        "online" => return Ok(Command::Online),
        "offline" => return Ok(Command::Offline),
        "clear" => return Ok(Command::Clear),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        _ => {}
    }

    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();
    match parts.first() {
        Some(&"login") => match parts.as_slice() {
            [_, email, password] => Ok(Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(ParseError::MissingArguments { usage: LOGIN_USAGE }),
        },
        Some(&"register") => parse_register_command(&parts),
        Some(&"reset") => match parts.as_slice() {
            [_, email] => Ok(Command::Reset {
                email: email.to_string(),
            }),
            _ => Err(ParseError::MissingArguments { usage: RESET_USAGE }),
        },
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

/// Parse "register EMAIL PASSWORD [ROLE] [NAME...]"
fn parse_register_command(parts: &[&str]) -> Result<Command, ParseError> {
    let (email, password, rest) = match parts {
        [_, email, password, rest @ ..] => (email, password, rest),
        _ => {
            return Err(ParseError::MissingArguments {
                usage: REGISTER_USAGE,
            });
        }
    };

    let (role, name_parts) = match rest.first().map(|token| token.parse::<Role>()) {
        Some(Ok(Role::Admin)) => return Err(ParseError::InvalidRole("admin".to_string())),
        Some(Ok(role)) => (Some(role), &rest[1..]),
        _ => (None, rest),
    };

    let name = if name_parts.is_empty() {
        None
    } else {
        Some(name_parts.join(" "))
    };

    Ok(Command::Register {
        email: email.to_string(),
        password: password.to_string(),
        role,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_word_commands() {
        assert_eq!(parse_command("google"), Ok(Command::Google));
        assert_eq!(parse_command("google-redirect"), Ok(Command::GoogleRedirect));
        assert_eq!(parse_command("  logout  "), Ok(Command::Logout));
        assert_eq!(parse_command(""), Ok(Command::Status));
        assert_eq!(parse_command("offline"), Ok(Command::Offline));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse_command("login ops@plant.example hunter22"),
            Ok(Command::Login {
                email: "ops@plant.example".to_string(),
                password: "hunter22".to_string(),
            })
        );
        assert_eq!(
            parse_command("login ops@plant.example"),
            Err(ParseError::MissingArguments { usage: LOGIN_USAGE })
        );
    }

    #[test]
    fn test_parse_register_with_role_and_name() {
        assert_eq!(
            parse_command("register jane@plant.example hunter22 integrator Jane Doe"),
            Ok(Command::Register {
                email: "jane@plant.example".to_string(),
                password: "hunter22".to_string(),
                role: Some(Role::Integrator),
                name: Some("Jane Doe".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_register_name_without_role() {
        assert_eq!(
            parse_command("register jane@plant.example hunter22 Jane"),
            Ok(Command::Register {
                email: "jane@plant.example".to_string(),
                password: "hunter22".to_string(),
                role: None,
                name: Some("Jane".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_register_rejects_admin() {
        assert_eq!(
            parse_command("register boss@plant.example hunter22 admin"),
            Err(ParseError::InvalidRole("admin".to_string()))
        );
    }

    #[test]
    fn test_parse_reset() {
        assert_eq!(
            parse_command("reset ops@plant.example"),
            Ok(Command::Reset {
                email: "ops@plant.example".to_string()
            })
        );
        assert!(matches!(
            parse_command("reset"),
            Err(ParseError::MissingArguments { .. })
        ));
    }

    #[test]
    fn test_startup_login_needs_both_flags() {
        assert_eq!(startup_login(None, None), Ok(None));
        assert_eq!(
            startup_login(Some("a@b.c".to_string()), Some("pw".to_string())),
            Ok(Some(Command::Login {
                email: "a@b.c".to_string(),
                password: "pw".to_string(),
            }))
        );
        assert_eq!(
            startup_login(Some("a@b.c".to_string()), None),
            Err(ParseError::MissingArguments {
                usage: STARTUP_LOGIN_USAGE
            })
        );
        assert!(matches!(
            startup_login(None, Some("pw".to_string())),
            Err(ParseError::MissingArguments { .. })
        ));
    }

    #[test]
    fn test_unrecognized_command() {
        let err = parse_command("dance now").unwrap_err();
        assert_eq!(err, ParseError::UnrecognizedCommand("dance now".to_string()));
        assert!(err.to_string().contains("help"));
    }
}
