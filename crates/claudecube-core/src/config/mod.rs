//! Daemon configuration.

mod settings;

pub use settings::{
    default_config_path, default_rules_path, default_settings_path, home_base_dir, policies_path,
    CubeConfig, EscalationSettings, ServerSettings, StopSettings, TelegramSettings,
};
