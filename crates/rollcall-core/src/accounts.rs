use crate::capabilities::{Account, AccountLookup, LookupError};
use crate::csv;
use std::path::{Path, PathBuf};

/// Read-only view over the flat user file (`user_id,name,...` header).
///
/// The file is re-read on every lookup so registrations made while a
/// session runs are picked up.
#[derive(Debug, Clone)]
pub struct CsvAccountDirectory {
    path: PathBuf,
}

impl CsvAccountDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountLookup for CsvAccountDirectory {
    fn get_user_by_id(&self, user_id: &str) -> Result<Option<Account>, LookupError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| LookupError(format!("{}: {e}", self.path.display())))?;
        let rows = csv::parse(&text);
        let Some((header, body)) = rows.split_first() else {
            return Ok(None);
        };

        let column = |name: &str| header.iter().position(|h| h.trim() == name);
        let id_col = column("user_id")
            .ok_or_else(|| LookupError(format!("{}: no user_id column", self.path.display())))?;
        let name_col = column("name");

        let wanted = user_id.trim().to_lowercase();
        let account = body
            .iter()
            .find(|row| row.get(id_col).is_some_and(|id| id.trim().to_lowercase() == wanted))
            .map(|row| Account {
                user_id: row[id_col].trim().to_string(),
                display_name: name_col
                    .and_then(|i| row.get(i))
                    .map(|n| n.trim().to_string())
                    .unwrap_or_default(),
            });
        Ok(account)
    }
}
