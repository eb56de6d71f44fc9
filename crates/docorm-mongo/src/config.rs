//! Connection settings.

use docorm_core::Error;
use mongodb::options::{ClientOptions, Credential, ServerAddress};

/// Default host when none is given.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default MongoDB port.
pub const DEFAULT_PORT: u16 = 27017;

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Seed hosts of the deployment.
    pub hosts: Vec<ServerAddress>,

    pub credential: Option<Credential>,

    /// Database all collections live in.
    pub target_database: Option<String>,

    /// Application name reported to the server.
    pub app_name: Option<String>,
}

impl ConnectionSettings {
    /// Create settings for the given seed hosts.
    pub fn new(hosts: Vec<ServerAddress>) -> Self {
        Self {
            hosts,
            credential: None,
            target_database: None,
            app_name: None,
        }
    }

    /// Settings for a server on localhost at the default port.
    pub fn localhost() -> Self {
        Self::new(vec![ServerAddress::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: Some(DEFAULT_PORT),
        }])
    }

    /// Parse a `mongodb://` or `mongodb+srv://` connection string.
    ///
    /// The database named in the path becomes the target database.
    pub async fn parse(connection_string: &str) -> Result<Self, Error> {
        let options = ClientOptions::parse(connection_string)
            .await
            .map_err(Error::client)?;
        Ok(Self {
            hosts: options.hosts,
            credential: options.credential,
            target_database: options.default_database,
            app_name: options.app_name,
        })
    }

    /// Add a seed host.
    pub fn with_host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.hosts.push(ServerAddress::Tcp {
            host: host.into(),
            port,
        });
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the database all collections live in.
    pub fn with_target_database(mut self, database: impl Into<String>) -> Self {
        self.target_database = Some(database.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Check the settings can address a database, returning its name.
    pub fn validate(&self) -> Result<&str, Error> {
        if self.hosts.is_empty() {
            return Err(Error::MissingHosts);
        }
        self.target_database
            .as_deref()
            .ok_or(Error::NoTargetDatabaseSpecified)
    }

    /// Driver options for these settings.
    pub(crate) fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default();
        options.hosts = self.hosts.clone();
        options.credential = self.credential.clone();
        options.app_name = self.app_name.clone();
        options.default_database = self.target_database.clone();
        options
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::localhost()
    }
}
