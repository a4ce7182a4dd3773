pub mod state;

pub use state::{
    API_KEY_ENV, AppSettings, ENV_PREFIX, SETTINGS_FILE_NAME, SettingsError, SettingsLoader,
};
