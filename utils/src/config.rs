use std::env;

/// Load a settings struct from `{FILE_NAME}.{ENV}.toml`.
///
/// `ENV` defaults to `dev`; `FILE_NAME` must be set.
pub fn get_config_from_env<'a, T: 'a>() -> Result<T, config::ConfigError>
where
    T: serde::Deserialize<'a>,
{
    let environment: String = env::var("ENV").unwrap_or_else(|_| "dev".into());
    let file_name: String = env::var("FILE_NAME")
        .map_err(|_| config::ConfigError::Message("FILE_NAME not set".to_string()))?;

    let file_path = format!("{}.{}.toml", file_name, environment);

    let mut configuration = config::Config::default();
    configuration.merge(config::File::with_name(&file_path))?;
    configuration.try_into()
}
