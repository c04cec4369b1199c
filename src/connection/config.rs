use crate::store::WriteOptions;

/// Mapper connection configuration
///
/// Carries the settings shared by every model registered on a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Store host
    pub host: String,

    /// Store port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Ask the store to acknowledge writes
    pub safe_writes: bool,

    /// Defer post hooks to the next scheduler turn after the core action
    pub yield_before_post_hooks: bool,

    /// Limit applied to inverse reference arrays that have no explicit page
    pub default_page_size: Option<usize>,
}

impl ConnectionConfig {
    /// Create a new configuration for `database`
    pub fn new(database: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            database: database.to_string(),
            safe_writes: true,
            yield_before_post_hooks: true,
            default_page_size: None,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set the host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set write acknowledgement
    pub fn safe_writes(mut self, safe: bool) -> Self {
        self.safe_writes = safe;
        self
    }

    /// Set whether post hooks wait for the next scheduler turn
    pub fn yield_before_post_hooks(mut self, enabled: bool) -> Self {
        self.yield_before_post_hooks = enabled;
        self
    }

    /// Set the default page size for inverse reference arrays
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = Some(size);
        self
    }

    /// Write options forwarded to the store on insert and update
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            safe: self.safe_writes,
        }
    }

    /// Parse from connection string
    ///
    /// Format: "docmapper://host:port/database?safe=true&page=20"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::from_url(
    ///     "docmapper://localhost:27017/blog?safe=false"
    /// )?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        if !url.starts_with("docmapper://") {
            return Err("URL must start with 'docmapper://'".to_string());
        }

        let url = &url["docmapper://".len()..];

        let (location, query) = match url.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url, None),
        };

        let host_parts: Vec<&str> = location.split('/').collect();
        if host_parts.len() != 2 || host_parts[1].is_empty() {
            return Err("Invalid host/database format".to_string());
        }

        let host_port: Vec<&str> = host_parts[0].split(':').collect();
        let host = host_port[0];
        let port = if host_port.len() > 1 {
            host_port[1].parse().map_err(|_| "Invalid port".to_string())?
        } else {
            27017
        };

        let mut config = Self::new(host_parts[1]).host(host).port(port);

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(format!("Invalid option '{}'", pair));
            };
            match key {
                "safe" => {
                    config.safe_writes = value
                        .parse()
                        .map_err(|_| format!("Invalid value for safe: {}", value))?;
                }
                "page" => {
                    let size = value
                        .parse()
                        .map_err(|_| format!("Invalid value for page: {}", value))?;
                    config.default_page_size = Some(size);
                }
                other => return Err(format!("Unknown option '{}'", other)),
            }
        }

        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "docmapper://{}:{}/{}?safe={}",
            self.host, self.port, self.database, self.safe_writes
        );
        if let Some(size) = self.default_page_size {
            url.push_str(&format!("&page={}", size));
        }
        url
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }

        if self.default_page_size == Some(0) {
            return Err("default_page_size must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("docmapper")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.database, "docmapper");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 27017);
        assert!(config.safe_writes);
        assert!(config.yield_before_post_hooks);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConnectionConfig::new("blog")
            .host("example.com")
            .port(27018)
            .safe_writes(false)
            .default_page_size(25);

        assert_eq!(config.host, "example.com");
        assert_eq!(config.port, 27018);
        assert!(!config.write_options().safe);
        assert_eq!(config.default_page_size, Some(25));
    }

    #[test]
    fn test_from_url() {
        let config =
            ConnectionConfig::from_url("docmapper://db.example.com:27019/production?safe=false&page=10")
                .unwrap();

        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 27019);
        assert_eq!(config.database, "production");
        assert!(!config.safe_writes);
        assert_eq!(config.default_page_size, Some(10));
    }

    #[test]
    fn test_from_url_default_port() {
        let config = ConnectionConfig::from_url("docmapper://localhost/testdb").unwrap();
        assert_eq!(config.port, 27017);
    }

    #[test]
    fn test_invalid_url() {
        assert!(ConnectionConfig::from_url("invalid://url").is_err());
        assert!(ConnectionConfig::from_url("docmapper://nodb").is_err());
        assert!(ConnectionConfig::from_url("docmapper://localhost/db?bogus=1").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::new("db").validate().is_ok());
        assert!(ConnectionConfig::new("").validate().is_err());
        assert!(ConnectionConfig::new("db").default_page_size(0).validate().is_err());
    }

    #[test]
    fn test_to_url_round_trips_options() {
        let config = ConnectionConfig::new("mydb").default_page_size(5);
        let parsed = ConnectionConfig::from_url(&config.to_url()).unwrap();
        assert_eq!(parsed.database, "mydb");
        assert_eq!(parsed.default_page_size, Some(5));
    }
}
