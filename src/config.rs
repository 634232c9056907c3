//! Environment-backed configuration for the fundwatch agent.
//!
//! All tunables are read once at startup (with optional `.env` support) into a
//! plain struct that the rest of the crate receives by reference.  Stage code
//! never touches the process environment.  Credential fields are redacted by
//! the `Debug` implementation so a dumped configuration can be logged safely.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;

use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

/// Default notification endpoint (LINE Notify compatible).
pub const DEFAULT_NOTIFY_API_URL: &str = "https://notify-api.line.me/api/notify";

/// Default Google Sheets API base.
pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";

/// Default destination pattern confirming the portfolio page was reached.
pub const DEFAULT_DESTINATION_PATTERN: &str = "**/account/user/port*";

/// Default label of the portal's cookie/consent accept button.
pub const DEFAULT_CONSENT_LABEL: &str = "ยอมรับ";

/// Default label of the remembered-session "enter system" control.
pub const DEFAULT_ENTER_LABEL: &str = "เข้าสู่ระบบการใช้งาน";

/// Verbosity level for run logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

/// Configuration values for one fundwatch run.
#[derive(Clone)]
pub struct FundwatchConfig {
    /// Portal login page (entry point of every run).
    pub login_url: Option<Url>,
    /// Direct URL of the portfolio page holding the target figure.
    pub portfolio_url: Option<Url>,
    /// Glob-style pattern the browser location must match after navigation.
    pub destination_pattern: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub consent_label: String,
    pub enter_label: String,
    pub notify_token: Option<String>,
    pub notify_recipient: Option<String>,
    pub notify_api_url: String,
    pub sheet_id: Option<String>,
    pub sheet_token: Option<String>,
    pub sheet_worksheet: String,
    pub sheets_api_url: String,
    pub csv_path: PathBuf,
    pub screenshot_path: PathBuf,
    pub chrome_executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub verbose: Verbosity,
    pub popup_wait_ms: u64,
    pub enter_button_wait_ms: u64,
    pub enter_link_wait_ms: u64,
    pub nav_timeout_ms: u64,
    pub quiet_timeout_ms: u64,
}

impl Default for FundwatchConfig {
    fn default() -> Self {
        FundwatchConfig {
            login_url: None,
            portfolio_url: None,
            destination_pattern: DEFAULT_DESTINATION_PATTERN.to_string(),
            username: None,
            password: None,
            consent_label: DEFAULT_CONSENT_LABEL.to_string(),
            enter_label: DEFAULT_ENTER_LABEL.to_string(),
            notify_token: None,
            notify_recipient: None,
            notify_api_url: DEFAULT_NOTIFY_API_URL.to_string(),
            sheet_id: None,
            sheet_token: None,
            sheet_worksheet: "returns".to_string(),
            sheets_api_url: DEFAULT_SHEETS_API_URL.to_string(),
            csv_path: PathBuf::from("fund-returns.csv"),
            screenshot_path: PathBuf::from("extraction_debug.png"),
            chrome_executable: None,
            user_data_dir: None,
            headless: true,
            verbose: Verbosity::default(),
            popup_wait_ms: 3_000,
            enter_button_wait_ms: 2_000,
            enter_link_wait_ms: 1_500,
            nav_timeout_ms: 15_000,
            quiet_timeout_ms: 10_000,
        }
    }
}

impl FundwatchConfig {
    /// Construct a configuration by reading `FUNDWATCH_*` environment
    /// variables, after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = FundwatchConfig::default();

        if let Some(value) = env_var("FUNDWATCH_LOGIN_URL") {
            config.login_url = Some(parse_url("FUNDWATCH_LOGIN_URL", &value)?);
        }

        if let Some(value) = env_var("FUNDWATCH_PORTFOLIO_URL") {
            config.portfolio_url = Some(parse_url("FUNDWATCH_PORTFOLIO_URL", &value)?);
        }

        if let Some(value) = env_var("FUNDWATCH_DEST_PATTERN") {
            config.destination_pattern = value;
        }

        if let Some(value) = env_var("FUNDWATCH_USERNAME") {
            config.username = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_PASSWORD") {
            config.password = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_CONSENT_LABEL") {
            config.consent_label = value;
        }

        if let Some(value) = env_var("FUNDWATCH_ENTER_LABEL") {
            config.enter_label = value;
        }

        if let Some(value) = env_var("FUNDWATCH_NOTIFY_TOKEN") {
            config.notify_token = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_NOTIFY_RECIPIENT") {
            config.notify_recipient = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_NOTIFY_API_URL") {
            config.notify_api_url = value;
        }

        if let Some(value) = env_var("FUNDWATCH_SHEET_ID") {
            config.sheet_id = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_SHEET_TOKEN") {
            config.sheet_token = Some(value);
        }

        if let Some(value) = env_var("FUNDWATCH_SHEET_WORKSHEET") {
            config.sheet_worksheet = value;
        }

        if let Some(value) = env_var("FUNDWATCH_SHEETS_API_URL") {
            config.sheets_api_url = value;
        }

        if let Some(value) = env_var("FUNDWATCH_CSV_PATH") {
            config.csv_path = PathBuf::from(value);
        }

        if let Some(value) = env_var("FUNDWATCH_SCREENSHOT_PATH") {
            config.screenshot_path = PathBuf::from(value);
        }

        if let Some(value) = env_var("FUNDWATCH_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("FUNDWATCH_USER_DATA_DIR") {
            config.user_data_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("FUNDWATCH_HEADLESS") {
            config.headless = parse_bool("FUNDWATCH_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("FUNDWATCH_VERBOSE") {
            let parsed = parse_u8("FUNDWATCH_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                ConfigError::InvalidEnumVariant {
                    field: "FUNDWATCH_VERBOSE",
                    value: parsed.to_string(),
                }
            })?;
        }

        if let Some(value) = env_var("FUNDWATCH_POPUP_WAIT_MS") {
            config.popup_wait_ms = parse_u64("FUNDWATCH_POPUP_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("FUNDWATCH_ENTER_BUTTON_WAIT_MS") {
            config.enter_button_wait_ms = parse_u64("FUNDWATCH_ENTER_BUTTON_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("FUNDWATCH_ENTER_LINK_WAIT_MS") {
            config.enter_link_wait_ms = parse_u64("FUNDWATCH_ENTER_LINK_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("FUNDWATCH_NAV_TIMEOUT_MS") {
            config.nav_timeout_ms = parse_u64("FUNDWATCH_NAV_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("FUNDWATCH_QUIET_TIMEOUT_MS") {
            config.quiet_timeout_ms = parse_u64("FUNDWATCH_QUIET_TIMEOUT_MS", &value)?;
        }

        Ok(config)
    }

    /// Extract the inputs a portal run cannot start without.
    ///
    /// Credentials are required even for deployments that expect the
    /// remembered-session path; whether they are submitted is decided by the
    /// portal at run time, so a run must always be able to fall back to the
    /// login form.
    pub fn run_target(&self) -> Result<RunTarget, ConfigError> {
        let login_url = self
            .login_url
            .clone()
            .ok_or(ConfigError::MissingField {
                field: "FUNDWATCH_LOGIN_URL",
            })?;
        let portfolio_url = self
            .portfolio_url
            .clone()
            .ok_or(ConfigError::MissingField {
                field: "FUNDWATCH_PORTFOLIO_URL",
            })?;
        let username = self.username.clone().ok_or(ConfigError::MissingField {
            field: "FUNDWATCH_USERNAME",
        })?;
        let password = self.password.clone().ok_or(ConfigError::MissingField {
            field: "FUNDWATCH_PASSWORD",
        })?;

        Ok(RunTarget {
            login_url,
            portfolio_url,
            credentials: Credentials { username, password },
        })
    }
}

impl fmt::Debug for FundwatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FundwatchConfig")
            .field("login_url", &self.login_url.as_ref().map(Url::as_str))
            .field(
                "portfolio_url",
                &self.portfolio_url.as_ref().map(Url::as_str),
            )
            .field("destination_pattern", &self.destination_pattern)
            .field("username", &redact(&self.username))
            .field("password", &redact(&self.password))
            .field("consent_label", &self.consent_label)
            .field("enter_label", &self.enter_label)
            .field("notify_token", &redact(&self.notify_token))
            .field("notify_recipient", &self.notify_recipient)
            .field("notify_api_url", &self.notify_api_url)
            .field("sheet_id", &self.sheet_id)
            .field("sheet_token", &redact(&self.sheet_token))
            .field("sheet_worksheet", &self.sheet_worksheet)
            .field("sheets_api_url", &self.sheets_api_url)
            .field("csv_path", &self.csv_path)
            .field("screenshot_path", &self.screenshot_path)
            .field("chrome_executable", &self.chrome_executable)
            .field("user_data_dir", &self.user_data_dir)
            .field("headless", &self.headless)
            .field("verbose", &self.verbose)
            .field("popup_wait_ms", &self.popup_wait_ms)
            .field("enter_button_wait_ms", &self.enter_button_wait_ms)
            .field("enter_link_wait_ms", &self.enter_link_wait_ms)
            .field("nav_timeout_ms", &self.nav_timeout_ms)
            .field("quiet_timeout_ms", &self.quiet_timeout_ms)
            .finish()
    }
}

/// Portal login credentials.  Values never appear in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The required inputs of a portal run, extracted from the configuration
/// before a browser is launched.
#[derive(Debug, Clone)]
pub struct RunTarget {
    pub login_url: Url,
    pub portfolio_url: Url,
    pub credentials: Credentials,
}

/// Errors that can arise while constructing a [`FundwatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is required but not set")]
    MissingField { field: &'static str },
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid URL '{value}' for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}
