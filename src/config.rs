use std::path::Path;

use ini::{Ini, Properties};
use thiserror::Error;

/// Section-name prefixes the config file may contain.
const KNOWN_SECTIONS: [&str; 5] = ["user", "gerrit", "git", "github", "patchwork"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fail to parse config file: {0}")]
    Parse(#[from] ini::Error),
    #[error("invalid section name \"{0}\"")]
    InvalidSection(String),
    #[error("section \"{section}\" is missing key \"{key}\"")]
    MissingKey { section: String, key: String },
}

/// One person whose contributions are being aggregated.
#[derive(Debug, Clone)]
pub struct TrackedUser {
    pub name: String,
    pub emails: [String; 2],
    pub function: String,
    pub github_username: Option<String>,
}

/// A git repository to mirror and crawl.
#[derive(Debug, Clone)]
pub struct GitSource {
    pub name: String,
    pub url: String,
    pub branch: String,
}

/// A gerrit or patchwork server.
#[derive(Debug, Clone)]
pub struct RestServer {
    pub name: String,
    pub url: String,
}

/// A github repository identified by its `owner/repo` path.
#[derive(Debug, Clone)]
pub struct ForgeRepo {
    pub name: String,
    pub owner_repo: String,
}

/// Parsed and validated configuration, immutable for the run.
#[derive(Debug, Clone)]
pub struct Config {
    users: Vec<TrackedUser>,
    git_sources: Vec<GitSource>,
    gerrit_servers: Vec<RestServer>,
    github_repos: Vec<ForgeRepo>,
    patchwork_servers: Vec<RestServer>,
}

fn get_key<'a>(section: &str, props: &'a Properties, key: &str) -> Result<&'a str, ConfigError> {
    props.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    })
}

/// An entry is enabled only when its `disable` value spells out "false".
fn enabled(section: &str, props: &Properties) -> Result<bool, ConfigError> {
    Ok(get_key(section, props, "disable")?.to_lowercase() == "false")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;

        // Reject unknown section names before reading anything else.
        for (section, _) in ini.iter() {
            let Some(name) = section else {
                // the default section is always accepted
                continue;
            };
            let prefix = name.split(' ').next().unwrap_or(name);
            if !KNOWN_SECTIONS.contains(&prefix) {
                return Err(ConfigError::InvalidSection(name.to_string()));
            }
        }

        let mut config = Config {
            users: Vec::new(),
            git_sources: Vec::new(),
            gerrit_servers: Vec::new(),
            github_repos: Vec::new(),
            patchwork_servers: Vec::new(),
        };

        for (section, props) in ini.iter() {
            let Some(name) = section else {
                continue;
            };
            let prefix = name.split(' ').next().unwrap_or(name);

            if !enabled(name, props)? {
                tracing::debug!("section \"{}\" is disabled, skipping", name);
                continue;
            }

            match prefix {
                "user" => config.users.push(TrackedUser {
                    name: get_key(name, props, "name")?.to_string(),
                    emails: [
                        get_key(name, props, "email1")?.to_string(),
                        get_key(name, props, "email2")?.to_string(),
                    ],
                    function: get_key(name, props, "function")?.to_string(),
                    github_username: props.get("github username").map(str::to_string),
                }),
                "git" => config.git_sources.push(GitSource {
                    name: get_key(name, props, "name")?.to_string(),
                    url: get_key(name, props, "url")?.to_string(),
                    branch: get_key(name, props, "branch")?.to_string(),
                }),
                "gerrit" => config.gerrit_servers.push(RestServer {
                    name: get_key(name, props, "name")?.to_string(),
                    url: get_key(name, props, "url")?.to_string(),
                }),
                "github" => config.github_repos.push(ForgeRepo {
                    name: get_key(name, props, "name")?.to_string(),
                    owner_repo: get_key(name, props, "owner/repo")?.to_string(),
                }),
                "patchwork" => config.patchwork_servers.push(RestServer {
                    name: get_key(name, props, "name")?.to_string(),
                    url: get_key(name, props, "url")?.to_string(),
                }),
                _ => unreachable!("section prefixes were validated above"),
            }
        }

        Ok(config)
    }

    pub fn users(&self) -> &[TrackedUser] {
        &self.users
    }

    pub fn user_by_email(&self, email: &str) -> Option<&TrackedUser> {
        self.users
            .iter()
            .find(|user| user.emails.iter().any(|e| e == email))
    }

    pub fn user_by_github(&self, login: &str) -> Option<&TrackedUser> {
        self.users
            .iter()
            .find(|user| user.github_username.as_deref() == Some(login))
    }

    pub fn git_sources(&self) -> &[GitSource] {
        &self.git_sources
    }

    pub fn gerrit_servers(&self) -> &[RestServer] {
        &self.gerrit_servers
    }

    pub fn github_repos(&self) -> &[ForgeRepo] {
        &self.github_repos
    }

    pub fn patchwork_servers(&self) -> &[RestServer] {
        &self.patchwork_servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const BASIC: &str = "\
[user alice]
disable = false
name = Alice
email1 = a1@x.com
email2 = a2@x.com
function = kernel
github username = alice-gh

[user bob]
disable = true
name = Bob
email1 = b1@x.com
email2 = b2@x.com
function = graphics

[git linux]
disable = false
name = linux
url = https://example.com/linux.git
branch = master

[gerrit chromium]
disable = false
name = chromium
url = chromium-review.example.com
";

    #[test]
    fn loads_enabled_users_with_two_aliases() {
        let file = write_config(BASIC);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.users().len(), 1);
        let alice = &config.users()[0];
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.emails, ["a1@x.com".to_string(), "a2@x.com".to_string()]);
        assert_eq!(alice.function, "kernel");
        assert_eq!(alice.github_username.as_deref(), Some("alice-gh"));
    }

    #[test]
    fn filters_disabled_platform_sections() {
        let file = write_config(BASIC);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.git_sources().len(), 1);
        assert_eq!(config.git_sources()[0].branch, "master");
        assert_eq!(config.gerrit_servers().len(), 1);
        assert!(config.github_repos().is_empty());
        assert!(config.patchwork_servers().is_empty());
    }

    #[test]
    fn rejects_unknown_section_name() {
        let file = write_config("[gitlab foo]\ndisable = false\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection(name) if name == "gitlab foo"));
    }

    #[test]
    fn rejects_enabled_section_with_missing_key() {
        let file = write_config("[user alice]\ndisable = false\nname = Alice\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key, .. } if key == "email1"));
    }

    #[test]
    fn looks_up_users_by_email_and_github_username() {
        let file = write_config(BASIC);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.user_by_email("a2@x.com").unwrap().name, "Alice");
        assert!(config.user_by_email("b1@x.com").is_none());
        assert_eq!(config.user_by_github("alice-gh").unwrap().name, "Alice");
        assert!(config.user_by_github("nobody").is_none());
    }
}
