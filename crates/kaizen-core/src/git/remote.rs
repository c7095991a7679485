/// Owner/repo pair inferred from a remote URL, supporting both SSH and
/// HTTPS forms (spec §6): `git@host:owner/repo(.git)?` and
/// `https://host/owner/repo(.git)?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RemoteRepo {
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        if let Some(rest) = url.strip_prefix("git@") {
            let (host, path) = rest.split_once(':')?;
            let (owner, repo) = split_owner_repo(path)?;
            return Some(Self { host: host.to_string(), owner, repo });
        }
        for scheme in ["https://", "http://"] {
            if let Some(rest) = url.strip_prefix(scheme) {
                let mut parts = rest.splitn(2, '/');
                let host = parts.next()?.to_string();
                let path = parts.next()?;
                let (owner, repo) = split_owner_repo(path)?;
                return Some(Self { host, owner, repo });
            }
        }
        None
    }

    pub fn api_base(&self) -> String {
        if self.host == "github.com" {
            "https://api.github.com".to_string()
        } else {
            format!("https://{}/api/v3", self.host)
        }
    }
}

fn split_owner_repo(path: &str) -> Option<(String, String)> {
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
