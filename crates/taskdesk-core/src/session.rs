use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Login state as returned by `POST /api/users/login` and persisted across
/// invocations. The token is an opaque bearer credential; the user object
/// is kept so commands never have to pick the token apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(default)]
    pub role: Option<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user
            .role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case("ADMIN"))
    }
}

#[derive(Debug)]
pub struct SessionStore {
    pub session_dir: PathBuf,
    pub session_path: PathBuf,
}

impl SessionStore {
    #[tracing::instrument(skip(session_dir))]
    pub fn open(session_dir: &Path) -> anyhow::Result<Self> {
        let session_dir = session_dir.to_path_buf();
        fs::create_dir_all(&session_dir)
            .with_context(|| format!("failed to create {}", session_dir.display()))?;

        let session_path = session_dir.join("session.json");
        info!(
            session_dir = %session_dir.display(),
            session = %session_path.display(),
            "opened session store"
        );

        Ok(Self {
            session_dir,
            session_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.session_path.exists() {
            debug!("no stored session");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.session_path)
            .with_context(|| format!("failed to read {}", self.session_path.display()))?;
        let session: Session = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt session file {}", self.session_path.display()))?;

        debug!(user = %session.user.email, "loaded session");
        Ok(Some(session))
    }

    /// Load the session or fail with a login hint; every authenticated
    /// command goes through here.
    pub fn require(&self) -> anyhow::Result<Session> {
        self.load()?
            .ok_or_else(|| anyhow!("not logged in; run `desk login <email>` first"))
    }

    pub fn require_admin(&self) -> anyhow::Result<Session> {
        let session = self.require()?;
        if !session.is_admin() {
            return Err(anyhow!(
                "this command needs an ADMIN session; logged in as {}",
                session.user.email
            ));
        }
        Ok(session)
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.user.email))]
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        let dir = self
            .session_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(session)?;
        writeln!(temp, "{serialized}")?;
        temp.flush()?;

        temp.persist(&self.session_path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.session_path.display(), err))?;

        info!("session saved");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.session_path.exists() {
            fs::remove_file(&self.session_path)
                .with_context(|| format!("failed to remove {}", self.session_path.display()))?;
            info!("session cleared");
        } else {
            debug!("no session to clear");
        }
        Ok(())
    }
}
