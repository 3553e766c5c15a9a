use gitlink_types::models::{Setting, Toggle};

use crate::error::CommandError;

/// Trigger word the command is registered under.
pub const TRIGGER: &str = "/gitlab";

/// Features a subscription gets when none are named.
pub const DEFAULT_FEATURES: &str = "pulls,issues";

const COMMAND_HELP: &str = "* |/gitlab connect| - Connect your account to your GitLab account
* |/gitlab disconnect| - Disconnect your account from your GitLab account
* |/gitlab todo| - Get a list of todos, your open merge requests and your assignments
* |/gitlab subscribe owner/repo [features]| - Subscribe the current channel to receive notifications about opened merge requests and issues for a repository
  * |features| is a comma-delimited list of one or more the following:
    * issues - includes new issues
    * pulls - includes new merge requests
    * label:\"<labelname>\" - must include \"pulls\" or \"issues\" in feature list when using a label
  * Defaults to \"pulls,issues\"
* |/gitlab unsubscribe owner/repo| - Unsubscribe the current channel from a repository
* |/gitlab me| - Display the connected GitLab account
* |/gitlab settings [setting] [value]| - Update your user settings
  * |setting| can be \"notifications\" or \"reminders\"
  * |value| can be \"on\" or \"off\"";

pub fn help_text() -> String {
    format!(
        "###### GitLab Integration - Slash Command Help\n{}",
        COMMAND_HELP.replace('|', "`")
    )
}

/// The action word, independent of its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    Todo,
    Me,
    Settings,
    Subscribe,
    Unsubscribe,
    Help,
}

impl Action {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            "todo" => Some(Self::Todo),
            "me" => Some(Self::Me),
            "settings" => Some(Self::Settings),
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Generic text shown when the action fails for an internal reason.
    pub fn failure_text(&self) -> &'static str {
        match self {
            Self::Connect => "Encountered an error connecting to GitLab.",
            Self::Disconnect => "Encountered an error disconnecting your GitLab account.",
            Self::Todo => "Encountered an error getting your to do items.",
            Self::Me => "Encountered an error getting your GitLab profile.",
            Self::Settings => "Encountered an error updating your settings.",
            Self::Subscribe => "Encountered an error trying to subscribe. Please try again.",
            Self::Unsubscribe => "Encountered an error trying to unsubscribe. Please try again.",
            Self::Help => "Unknown error.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsChange {
    pub setting: Setting,
    pub toggle: Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Todo,
    Me,
    Help,
    Settings(SettingsChange),
    Subscribe { repo: String, features: String },
    Unsubscribe { repo: String },
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Self::Connect => Action::Connect,
            Self::Disconnect => Action::Disconnect,
            Self::Todo => Action::Todo,
            Self::Me => Action::Me,
            Self::Help => Action::Help,
            Self::Settings(_) => Action::Settings,
            Self::Subscribe { .. } => Action::Subscribe,
            Self::Unsubscribe { .. } => Action::Unsubscribe,
        }
    }
}

/// A line that is for us, with its arguments either validated or rejected.
#[derive(Debug)]
pub struct Invocation {
    pub action: Action,
    pub command: Result<Command, CommandError>,
}

/// Parse a raw command line.
///
/// Returns `None` when the line is not addressed to [`TRIGGER`] or names no
/// known action, so another handler may take it.
pub fn parse(line: &str) -> Option<Invocation> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != TRIGGER {
        return None;
    }

    let action = Action::from_name(tokens.next()?)?;
    let params: Vec<&str> = tokens.collect();

    let command = match action {
        Action::Connect => Ok(Command::Connect),
        Action::Disconnect => Ok(Command::Disconnect),
        Action::Todo => Ok(Command::Todo),
        Action::Me => Ok(Command::Me),
        Action::Help => Ok(Command::Help),
        Action::Settings => parse_settings(&params).map(Command::Settings),
        Action::Subscribe => match params.split_first() {
            None => Err(missing_repository()),
            Some((repo, rest)) => Ok(Command::Subscribe {
                repo: repo.to_string(),
                features: if rest.is_empty() {
                    DEFAULT_FEATURES.to_string()
                } else {
                    rest.join(" ")
                },
            }),
        },
        Action::Unsubscribe => match params.first() {
            None => Err(missing_repository()),
            Some(repo) => Ok(Command::Unsubscribe {
                repo: repo.to_string(),
            }),
        },
    };

    Some(Invocation { action, command })
}

fn parse_settings(params: &[&str]) -> Result<SettingsChange, CommandError> {
    let [setting, value] = params else {
        return Err(CommandError::Validation(
            "Please specify both a setting and value. Use `/gitlab help` for more usage information."
                .to_string(),
        ));
    };

    let setting = Setting::from_name(setting).ok_or_else(|| {
        CommandError::Validation(
            "Unknown setting. Accepted settings are: \"notifications\" or \"reminders\".".to_string(),
        )
    })?;

    let toggle = Toggle::from_name(value).ok_or_else(|| {
        CommandError::Validation("Invalid value. Accepted values are: \"on\" or \"off\".".to_string())
    })?;

    Ok(SettingsChange { setting, toggle })
}

fn missing_repository() -> CommandError {
    CommandError::Validation("Please specify a repository.".to_string())
}
