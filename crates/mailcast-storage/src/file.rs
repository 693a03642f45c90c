//! Flat-file resource provider
//!
//! Layout of the resource directory:
//!
//! ```text
//! recipients.txt        email,firstName,lastName,company
//! templates/*.html      one template per file, named by file stem
//! relays.txt            host|port|user|pass
//! api_keys.txt          one API key per line
//! origins.txt           ip[:port]
//! subjects.txt          one per line
//! from_names.txt        one per line
//! from_addresses.txt    one per line
//! policy_keywords.txt   one per line
//! placeholders.txt      name:path||fallback
//! attachments/          every file is attached
//! ```

use crate::provider::{PlaceholderDef, ResourceProvider, SenderPools};
use async_trait::async_trait;
use mailcast_common::{
    Attachment, Config, DispatchMode, Error, Recipient, Result, TransportEndpoint,
};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Port used when a relay line carries an unusable port
const FALLBACK_RELAY_PORT: u16 = 587;

/// Keywords checked when no policy file exists
const DEFAULT_POLICY_KEYWORDS: &[&str] = &["viagra", "casino", "lottery", "winner"];

/// Resource provider reading a directory of flat files
pub struct FileResourceProvider {
    base_path: PathBuf,
    api_base_url: String,
    origin_port: u16,
}

impl FileResourceProvider {
    /// Create a provider over a resource directory
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            api_base_url: mailcast_common::config::ApiConfig::default().base_url,
            origin_port: mailcast_common::config::DirectConfig::default().port,
        }
    }

    /// Create a provider from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.resources.dir)
            .with_api_base_url(config.api.base_url.clone())
            .with_origin_port(config.direct.port)
    }

    /// Set the API base URL paired with every key in `api_keys.txt`
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    /// Set the port used for origin lines without an explicit port
    pub fn with_origin_port(mut self, port: u16) -> Self {
        self.origin_port = port;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Read a file whose absence is tolerated
    async fn read_optional(&self, name: &str) -> Option<String> {
        let path = self.base_path.join(name);
        match fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(path = %path.display(), "Could not read {}: {}", name, e);
                None
            }
        }
    }

    /// Non-blank, trimmed lines of an optional file
    async fn read_lines(&self, name: &str) -> Vec<String> {
        let lines = self
            .read_optional(name)
            .await
            .map(|content| non_blank_lines(&content))
            .unwrap_or_default();
        debug!(count = lines.len(), "Loaded {}", name);
        lines
    }

    fn parse_relay(line: &str) -> Option<TransportEndpoint> {
        let mut parts = line.split('|').map(str::trim);
        let host = parts.next().filter(|h| !h.is_empty())?;
        let port_str = parts.next().unwrap_or_default();
        let username = parts.next().unwrap_or_default();
        let password = parts.next().unwrap_or_default();

        let port = match port_str.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                warn!(
                    host = %host,
                    "Invalid port '{}', using {}",
                    port_str, FALLBACK_RELAY_PORT
                );
                FALLBACK_RELAY_PORT
            }
        };

        Some(TransportEndpoint::Relay {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn parse_origin(&self, line: &str) -> Option<TransportEndpoint> {
        if let Ok(socket) = line.parse::<SocketAddr>() {
            return Some(TransportEndpoint::Origin {
                address: socket.ip(),
                port: socket.port(),
            });
        }
        match line.parse::<IpAddr>() {
            Ok(address) => Some(TransportEndpoint::Origin {
                address,
                port: self.origin_port,
            }),
            Err(_) => {
                warn!("Ignoring malformed origin address '{}'", line);
                None
            }
        }
    }
}

fn non_blank_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_recipient(line: &str) -> Recipient {
    let mut fields = line.split(',').map(str::trim);
    let email = fields.next().unwrap_or_default();
    let first_name = fields.next().unwrap_or_default();
    let last_name = fields.next().unwrap_or_default();
    let company = fields.next().unwrap_or_default();

    Recipient::new(email)
        .with_name(first_name, last_name)
        .with_company(company)
}

#[async_trait]
impl ResourceProvider for FileResourceProvider {
    async fn load_recipients(&self) -> Result<Vec<Recipient>> {
        let path = self.base_path.join("recipients.txt");
        let content = fs::read_to_string(&path).await.map_err(|e| {
            Error::MissingResource(format!("recipients ({}): {}", path.display(), e))
        })?;

        let recipients: Vec<Recipient> = non_blank_lines(&content)
            .iter()
            .map(|line| parse_recipient(line))
            .collect();

        info!(count = recipients.len(), "Loaded recipients");
        Ok(recipients)
    }

    async fn load_templates(&self) -> Result<BTreeMap<String, String>> {
        let dir = self.base_path.join("templates");
        let mut templates = BTreeMap::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), "Could not read templates: {}", e);
                return Ok(templates);
            }
        };

        while let Some(entry) = next_entry(&mut entries, &dir).await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path).await {
                Ok(body) => {
                    templates.insert(name.to_string(), body);
                }
                Err(e) => warn!(path = %path.display(), "Skipping unreadable template: {}", e),
            }
        }

        info!(count = templates.len(), "Loaded templates");
        Ok(templates)
    }

    async fn load_endpoint_pool(&self, mode: DispatchMode) -> Result<Vec<TransportEndpoint>> {
        let pool: Vec<TransportEndpoint> = match mode {
            DispatchMode::ApiRelay => self
                .read_lines("api_keys.txt")
                .await
                .into_iter()
                .map(|api_key| TransportEndpoint::Api {
                    base_url: self.api_base_url.clone(),
                    api_key,
                })
                .collect(),
            DispatchMode::AuthenticatedRelay => self
                .read_lines("relays.txt")
                .await
                .iter()
                .filter_map(|line| Self::parse_relay(line))
                .collect(),
            DispatchMode::AddressRotation => self
                .read_lines("origins.txt")
                .await
                .iter()
                .filter_map(|line| self.parse_origin(line))
                .collect(),
            // Origin addresses come from the host, not from a file
            DispatchMode::DirectOrigin => Vec::new(),
        };

        info!(mode = %mode, count = pool.len(), "Loaded endpoint pool");
        Ok(pool)
    }

    async fn load_senders(&self) -> Result<SenderPools> {
        Ok(SenderPools {
            subjects: self.read_lines("subjects.txt").await,
            from_names: self.read_lines("from_names.txt").await,
            from_addresses: self.read_lines("from_addresses.txt").await,
        })
    }

    async fn load_policy_keywords(&self) -> Result<Vec<String>> {
        match self.read_optional("policy_keywords.txt").await {
            Some(content) => Ok(non_blank_lines(&content)),
            None => Ok(DEFAULT_POLICY_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect()),
        }
    }

    async fn load_placeholders(&self) -> Result<Vec<PlaceholderDef>> {
        let lines = self.read_lines("placeholders.txt").await;
        let defs: Vec<PlaceholderDef> = lines
            .iter()
            .filter_map(|line| {
                let def = PlaceholderDef::parse_line(line);
                if def.is_none() {
                    warn!("Skipping malformed placeholder line '{}'", line);
                }
                def
            })
            .collect();
        Ok(defs)
    }

    async fn load_attachments(&self) -> Result<Vec<Attachment>> {
        let dir = self.base_path.join("attachments");
        let mut attachments = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %dir.display(), "No attachments: {}", e);
                return Ok(attachments);
            }
        };

        while let Some(entry) = next_entry(&mut entries, &dir).await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping attachment: {}", e);
                    continue;
                }
            }
            match fs::read(&path).await {
                Ok(content) => {
                    let filename = entry.file_name().to_string_lossy().into_owned();
                    attachments.push(Attachment { filename, content });
                }
                Err(e) => warn!(path = %path.display(), "Skipping unreadable attachment: {}", e),
            }
        }

        attachments.sort_by(|a, b| a.filename.cmp(&b.filename));
        info!(count = attachments.len(), "Loaded attachments");
        Ok(attachments)
    }
}

/// Next directory entry; a listing error ends the scan with what was read
async fn next_entry(entries: &mut fs::ReadDir, dir: &Path) -> Option<fs::DirEntry> {
    match entries.next_entry().await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(path = %dir.display(), "Stopped reading directory: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_load_recipients() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "recipients.txt",
            "a@x.com,Ada,Lovelace,Engines\n\nb@x.com\r\nc@x.com,Cy\n",
        );

        let provider = FileResourceProvider::new(dir.path());
        let recipients = provider.load_recipients().await.unwrap();

        assert_eq!(recipients.len(), 3);
        assert_eq!(
            recipients[0],
            Recipient::new("a@x.com")
                .with_name("Ada", "Lovelace")
                .with_company("Engines")
        );
        assert_eq!(recipients[1], Recipient::new("b@x.com"));
        assert_eq!(recipients[2].first_name, "Cy");
        assert_eq!(recipients[2].company, "");
    }

    #[tokio::test]
    async fn test_missing_recipients_is_fatal() {
        let dir = TempDir::new().unwrap();
        let provider = FileResourceProvider::new(dir.path());

        let err = provider.load_recipients().await.unwrap_err();
        assert!(matches!(err, Error::MissingResource(_)));
    }

    #[tokio::test]
    async fn test_missing_optional_resources_default() {
        let dir = TempDir::new().unwrap();
        let provider = FileResourceProvider::new(dir.path());

        assert!(provider.load_templates().await.unwrap().is_empty());
        assert_eq!(provider.load_senders().await.unwrap(), SenderPools::default());
        assert!(provider.load_placeholders().await.unwrap().is_empty());
        assert!(provider.load_attachments().await.unwrap().is_empty());
        assert!(provider
            .load_endpoint_pool(DispatchMode::AuthenticatedRelay)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            provider.load_policy_keywords().await.unwrap(),
            vec!["viagra", "casino", "lottery", "winner"]
        );
    }

    #[tokio::test]
    async fn test_load_templates_by_stem() {
        let dir = TempDir::new().unwrap();
        write(&dir, "templates/welcome.html", "<p>Hi [firstName]</p>");
        write(&dir, "templates/notes.txt", "ignored");

        let provider = FileResourceProvider::new(dir.path());
        let templates = provider.load_templates().await.unwrap();

        assert_eq!(templates.len(), 1);
        assert_eq!(templates["welcome"], "<p>Hi [firstName]</p>");
    }

    #[tokio::test]
    async fn test_unreadable_template_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, "templates/good.html", "<p>ok</p>");
        std::fs::write(dir.path().join("templates/bad.html"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::create_dir_all(dir.path().join("templates/folder.html")).unwrap();

        let provider = FileResourceProvider::new(dir.path());
        let templates = provider.load_templates().await.unwrap();

        assert_eq!(templates.len(), 1);
        assert_eq!(templates["good"], "<p>ok</p>");
    }

    #[tokio::test]
    async fn test_attachment_subdirectory_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, "attachments/a.txt", "text");
        write(&dir, "attachments/nested/b.txt", "deeper");

        let provider = FileResourceProvider::new(dir.path());
        let attachments = provider.load_attachments().await.unwrap();

        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "a.txt");
    }

    #[tokio::test]
    async fn test_load_relays_with_port_fallback() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "relays.txt",
            "smtp.a.com|465|u1|p1\nsmtp.b.com|notaport|u2|p2\n|25|x|y\n",
        );

        let provider = FileResourceProvider::new(dir.path());
        let pool = provider
            .load_endpoint_pool(DispatchMode::AuthenticatedRelay)
            .await
            .unwrap();

        let labels: Vec<String> = pool.iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["smtp.a.com:465", "smtp.b.com:587"]);
    }

    #[tokio::test]
    async fn test_load_origins_and_api_keys() {
        let dir = TempDir::new().unwrap();
        write(&dir, "origins.txt", "192.0.2.1\n192.0.2.2:2525\n[2001:db8::1]:25\nbogus\n");
        write(&dir, "api_keys.txt", "key-one\nkey-two\n");

        let provider =
            FileResourceProvider::new(dir.path()).with_api_base_url("http://localhost:9000");

        let origins = provider
            .load_endpoint_pool(DispatchMode::AddressRotation)
            .await
            .unwrap();
        let labels: Vec<String> = origins.iter().map(|e| e.label()).collect();
        assert_eq!(
            labels,
            vec!["192.0.2.1:25", "192.0.2.2:2525", "[2001:db8::1]:25"]
        );

        let keys = provider
            .load_endpoint_pool(DispatchMode::ApiRelay)
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            keys[0],
            TransportEndpoint::Api {
                base_url: "http://localhost:9000".to_string(),
                api_key: "key-one".to_string(),
            }
        );

        assert!(provider
            .load_endpoint_pool(DispatchMode::DirectOrigin)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_load_senders_placeholders_and_attachments() {
        let dir = TempDir::new().unwrap();
        write(&dir, "subjects.txt", "Hello [firstName]\nNews\n");
        write(&dir, "from_names.txt", "Team\n");
        write(&dir, "from_addresses.txt", "team@example.com\n");
        write(&dir, "placeholders.txt", "domain:email.split('@')[1]||example.com\nbroken\n");
        write(&dir, "attachments/b.pdf", "pdf");
        write(&dir, "attachments/a.txt", "text");

        let provider = FileResourceProvider::new(dir.path());

        let senders = provider.load_senders().await.unwrap();
        assert_eq!(senders.subjects, vec!["Hello [firstName]", "News"]);
        assert_eq!(senders.from_addresses, vec!["team@example.com"]);

        let placeholders = provider.load_placeholders().await.unwrap();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].name, "domain");

        let attachments = provider.load_attachments().await.unwrap();
        let names: Vec<&str> = attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.pdf"]);
        assert_eq!(attachments[0].content, b"text".to_vec());
    }
}
