use anyhow::Result;
use reqwest::blocking::{Client, Response};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("orion/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Download the published install script into a temp file that lives as
/// long as the returned handle.
pub fn download_script(client: &Client, url: &str) -> Result<NamedTempFile> {
    let mut resp: Response = client.get(url).send()?.error_for_status()?;
    let tmp = tempfile::Builder::new()
        .prefix("pixi-install-")
        .suffix(".sh")
        .tempfile()?;
    std::io::copy(&mut resp, &mut tmp.as_file())?;
    Ok(tmp)
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut f = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
