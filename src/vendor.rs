use std::io::Write;
use std::path::Path;
use std::time::Duration;
use log::debug;
use thiserror::Error;
use crate::config::{self, Instance};

#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("request to {url} failed: {err}")]
    Transport {
        url: String,
        err: reqwest::Error,
    },

    #[error("response from {url} is not JSON (HTTP {status}); this is usually an HTML error page, check the credentials and the instance name")]
    NotJson {
        url: String,
        status: u16,
    },

    #[error("no value found for mid.version in the response from {url} (HTTP {status}); check that the user may read sys_properties")]
    NoValue {
        url: String,
        status: u16,
    },

    #[error("download {url}: HTTP {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    #[error("write {path}: {err}")]
    Write {
        err: std::io::Error,
        path: String,
    },

    #[error("store {path}: {err}")]
    Persist {
        err: tempfile::PersistError,
        path: String,
    },
}

/// The vendor instance and its download server.
pub trait Vendor {
    /// The agent version string the instance asks for.
    async fn fetch_version(&self) -> Result<String, Error>;

    /// Download `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, Error>;
}

pub struct Client {
    http: reqwest::Client,
    version_url: String,
    username: String,
    password: String,
    download_timeout: Duration,
}

impl Client {
    pub fn new(settings: &config::File, instance: &Instance) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.download.connect_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base = instance.url(&settings.vendor.instance_url);
        Ok(Self {
            http,
            version_url: format!("{}{}", base.trim_end_matches('/'), settings.vendor.version_path),
            username: instance.username.clone(),
            password: instance.password.clone(),
            download_timeout: Duration::from_secs(settings.download.timeout_secs),
        })
    }
}

impl Vendor for Client {
    async fn fetch_version(&self) -> Result<String, Error> {
        debug!("Querying {}", self.version_url);
        let resp = self.http.get(&self.version_url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| Error::Transport { url: self.version_url.clone(), err })?;

        let status = resp.status().as_u16();
        let bytes = resp.bytes()
            .await
            .map_err(|err| Error::Transport { url: self.version_url.clone(), err })?;

        version_from_body(&self.version_url, status, &bytes)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, Error> {
        let transport = |err: reqwest::Error| Error::Transport { url: url.to_string(), err };
        let write = |err: std::io::Error| Error::Write { err, path: dest.display().to_string() };

        let mut resp = self.http.get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }
        if let Some(length) = resp.content_length() {
            debug!("Downloading {length} bytes from {url}");
        }

        let dir = dest.parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write)?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.map_err(transport)? {
            file.write_all(&chunk).map_err(write)?;
            written += chunk.len() as u64;
        }
        file.flush().map_err(write)?;
        file.persist(dest).map_err(|err| Error::Persist { err, path: dest.display().to_string() })?;

        Ok(written)
    }
}

/// Pull `result[0].value` out of a sys_properties table response.
pub fn version_from_body(url: &str, status: u16, body: &[u8]) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::from_slice(body).map_err(|_| {
        debug!("Response body: {}", String::from_utf8_lossy(body));
        Error::NotJson { url: url.to_string(), status }
    })?;

    json["result"][0]["value"]
        .as_str()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::NoValue { url: url.to_string(), status })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://acme.vendor.example/api/now/table/sys_properties";

    #[test]
    fn extracts_version_value() {
        let body = br#"{"result":[{"value":"acme_stable_03-14-2024"}]}"#;
        assert_eq!(version_from_body(URL, 200, body).unwrap(), "acme_stable_03-14-2024");
    }

    #[test]
    fn html_error_page_is_not_json() {
        let body = b"<html><body>Instance Hibernating</body></html>";
        let err = version_from_body(URL, 200, body).unwrap_err();
        assert!(matches!(err, Error::NotJson { status: 200, .. }));
        assert!(err.to_string().contains("check the credentials and the instance name"));
    }

    #[test]
    fn json_without_value_has_no_value() {
        let bodies: [&[u8]; 5] = [
            br#"{"result":[]}"#,
            br#"{"result":[{"value":null}]}"#,
            br#"{"result":[{"value":""}]}"#,
            br#"{"result":"nope"}"#,
            br#"{"error":{"message":"User Not Authenticated"},"status":"failure"}"#,
        ];
        for body in bodies {
            let err = version_from_body(URL, 401, body).unwrap_err();
            assert!(matches!(err, Error::NoValue { status: 401, .. }), "{err}");
            assert!(err.to_string().starts_with("no value found"));
        }
    }

    #[test]
    fn version_url_joins_instance_and_path() {
        let settings = config::File::default();
        let instance = Instance::new("acme".into(), "Lab".into(), None, "user".into(), "pass".into());
        let client = Client::new(&settings, &instance).unwrap();
        assert_eq!(
            client.version_url,
            "https://acme.vendor.example/api/now/table/sys_properties?sysparm_query=name=mid.version&sysparm_fields=value&sysparm_limit=1"
        );
    }

    /// Answer one request on a local port with `response`, then close the connection.
    fn serve_once(response: &'static str) -> String {
        use std::io::{BufRead, BufReader};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/bundle-recipe.zip")
    }

    fn local_client() -> Client {
        let settings = config::File::default();
        let instance = Instance::new("acme".into(), "Lab".into(), None, "user".into(), "pass".into());
        let mut client = Client::new(&settings, &instance).unwrap();
        client.http = reqwest::Client::builder().no_proxy().build().unwrap();
        client
    }

    #[tokio::test]
    async fn download_stores_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bundle-recipe.zip");
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello");

        assert_eq!(local_client().download(&url, &dest).await.unwrap(), 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn download_rejects_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bundle-recipe.zip");
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

        let err = local_client().download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }), "{err}");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn truncated_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bundle-recipe.zip");
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 6000\r\nConnection: close\r\n\r\nhello");

        let err = local_client().download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "{err}");
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
