//! Create, replace or update passes from JSON files.
//!
//! # Usage
//!
//! ```bash
//! # Create or replace (file holds passTypeIdentifier, serialNumber, templateType, data)
//! wallet-cli pass put --file pass.json
//!
//! # Deep-merge a data object into an existing pass
//! wallet-cli pass update pass.com.example.ticket 42 --file patch.json
//! ```
//!
//! Both commands wake registered devices afterwards unless `--no-notify` is
//! given.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use wallet_core::PassKey;
use wallet_server::db::{PassRepository, PassStore};
use wallet_server::models::{NewPass, Pass};

use super::notify::broadcast;
use super::{CliError, connect, dispatcher};

/// Contents of a pass definition file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassFile {
    pub pass_type_identifier: String,
    pub serial_number: String,
    #[serde(default = "default_template_type")]
    pub template_type: String,
    pub data: Value,
}

fn default_template_type() -> String {
    "generic".to_string()
}

impl PassFile {
    /// Validate and convert into a store input.
    pub fn into_new_pass(self) -> Result<NewPass, CliError> {
        let key = PassKey::new(self.pass_type_identifier, self.serial_number);
        if key.is_blank() {
            return Err(CliError::InvalidPass(
                "passTypeIdentifier and serialNumber must not be blank".to_string(),
            ));
        }
        require_object(&self.data)?;
        Ok(NewPass {
            key,
            template_type: self.template_type,
            data: self.data,
        })
    }
}

/// Create or replace the pass described by `file`.
pub async fn put(file: &Path, notify: bool) -> Result<(), CliError> {
    let new = read_json::<PassFile>(file).await?.into_new_pass()?;

    let pool = connect().await?;
    let pass = PassRepository::new(pool.clone()).create_or_replace(new).await?;
    report_saved(&pass);

    if notify {
        broadcast(&dispatcher(&pool)?, &pass.key()).await?;
    }
    Ok(())
}

/// Deep-merge the object in `file` into an existing pass.
pub async fn update(
    pass_type_identifier: &str,
    serial_number: &str,
    file: &Path,
    notify: bool,
) -> Result<(), CliError> {
    let partial = read_json::<Value>(file).await?;
    require_object(&partial)?;

    let pool = connect().await?;
    let key = PassKey::new(pass_type_identifier, serial_number);
    let pass = PassRepository::new(pool.clone())
        .merge_update(&key, partial)
        .await?;
    report_saved(&pass);

    if notify {
        broadcast(&dispatcher(&pool)?, &key).await?;
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
    Ok(serde_json::from_str(&content)?)
}

fn require_object(data: &Value) -> Result<(), CliError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(CliError::InvalidPass("data must be a JSON object".to_string()))
    }
}

fn report_saved(pass: &Pass) {
    tracing::info!(
        pass = %pass.key(),
        version = %pass.version_updated_at,
        "Pass saved"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_read_pass_file_defaults_template() {
        let file = write_temp(r#"{"passTypeIdentifier":"pass.t","serialNumber":"s1","data":{"a":1}}"#);

        let new = read_json::<PassFile>(file.path())
            .await
            .unwrap()
            .into_new_pass()
            .unwrap();

        assert_eq!(new.key, PassKey::new("pass.t", "s1"));
        assert_eq!(new.template_type, "generic");
    }

    #[tokio::test]
    async fn test_pass_file_rejects_non_object_data() {
        let file = write_temp(r#"{"passTypeIdentifier":"pass.t","serialNumber":"s1","data":[1]}"#);

        let result = read_json::<PassFile>(file.path())
            .await
            .unwrap()
            .into_new_pass();

        assert!(matches!(result, Err(CliError::InvalidPass(_))));
    }

    #[tokio::test]
    async fn test_pass_file_rejects_blank_serial() {
        let file = write_temp(r#"{"passTypeIdentifier":"pass.t","serialNumber":" ","data":{}}"#);

        let result = read_json::<PassFile>(file.path())
            .await
            .unwrap()
            .into_new_pass();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = read_json::<Value>(Path::new("/definitely/not/here.json")).await;
        assert!(matches!(result, Err(CliError::Io { .. })));
    }
}
