// Default generation settings
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a resourceful developer. You have much knowledge on software development";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.95;

/// Settings file looked up in the working directory when `--settings` is absent
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";

pub const PROMPT_LABEL: &str = "Enter your prompt : ";

pub const FORMAT_RESET: &str = "\x1b[0m";
pub const FORMAT_BOLD: &str = "\x1b[1m";
pub const FORMAT_GRAY: &str = "\x1b[90m";
pub const FORMAT_CYAN: &str = "\x1b[36m";
