use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facematch", about = "Compare a face against candidate images via facematchd")]
struct Cli {
    /// Base URL of the facematchd server
    #[arg(long, global = true, default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a captured face against candidate image URLs (or data: URIs), in order
    Compare {
        /// Captured image: local file path or http(s) URL
        #[arg(short, long)]
        image: String,
        /// Candidate image URLs, tried in the order given
        candidates: Vec<String>,
    },
    /// Show daemon status
    Status,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchResponse {
    match_found: bool,
    matched_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    match cli.command {
        Commands::Compare { image, candidates } => {
            let candidates = filter_candidates(candidates);
            if candidates.is_empty() {
                tracing::info!("no valid candidate URLs; skipping daemon call");
                println!("No match found");
                return Ok(());
            }

            let (bytes, mime) = load_image(&client, &image).await?;
            let body = serde_json::json!({
                "capturedImage": encode_data_uri(&mime, &bytes),
                "databaseUrls": candidates,
            });

            let response = client
                .post(endpoint(&cli.server, "/api/compare-faces"))
                .json(&body)
                .send()
                .await
                .with_context(|| format!("cannot reach facematchd at {}", cli.server))?;

            let result: MatchResponse = read_json(response).await?;
            match result.matched_image_url {
                Some(url) if result.match_found => println!("Match found: {url}"),
                _ => println!("No match found"),
            }
        }
        Commands::Status => {
            let response = client
                .get(endpoint(&cli.server, "/api/status"))
                .send()
                .await
                .with_context(|| format!("cannot reach facematchd at {}", cli.server))?;
            let status: serde_json::Value = read_json(response).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn endpoint(server: &str, path: &str) -> String {
    format!("{}{path}", server.trim_end_matches('/'))
}

/// Keep absolute http(s) URLs and `data:` URIs, warn about the rest.
fn filter_candidates(candidates: Vec<String>) -> Vec<String> {
    candidates
        .into_iter()
        .filter(|candidate| match reqwest::Url::parse(candidate) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "data") => true,
            Ok(url) => {
                tracing::warn!(candidate = %candidate, scheme = url.scheme(), "skipping unsupported candidate");
                false
            }
            Err(err) => {
                tracing::warn!(candidate = %candidate, error = %err, "skipping invalid candidate URL");
                false
            }
        })
        .collect()
}

async fn load_image(client: &reqwest::Client, source: &str) -> Result<(Vec<u8>, String)> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = client
            .get(source)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("failed to fetch {source}"))?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime(source).to_string());
        let bytes = response.bytes().await?;
        tracing::debug!(source, bytes = bytes.len(), %mime, "image fetched");
        return Ok((bytes.to_vec(), mime));
    }

    let bytes = tokio::fs::read(source)
        .await
        .with_context(|| format!("failed to read {source}"))?;
    Ok((bytes, guess_mime(source).to_string()))
}

fn guess_mime(source: &str) -> &'static str {
    let ext = Path::new(source.split(['?', '#']).next().unwrap_or(source))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        bail!("facematchd returned {status}: {message}");
    }

    serde_json::from_slice(&body).context("unexpected response from facematchd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("face.PNG"), "image/png");
        assert_eq!(guess_mime("/tmp/a.webp"), "image/webp");
        assert_eq!(guess_mime("https://cdn/x.png?size=large"), "image/png");
        assert_eq!(guess_mime("capture.jpeg"), "image/jpeg");
        assert_eq!(guess_mime("no-extension"), "image/jpeg");
    }

    #[test]
    fn test_encode_data_uri() {
        assert_eq!(encode_data_uri("image/png", b"hello"), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_filter_candidates_keeps_order() {
        let kept = filter_candidates(vec![
            "https://x/b.jpg".into(),
            "not a url".into(),
            "/local/face.jpg".into(),
            "ftp://x/a.jpg".into(),
            "http://x/a.jpg".into(),
            "data:image/png;base64,aGVsbG8=".into(),
            "file:///tmp/face.jpg".into(),
        ]);
        assert_eq!(
            kept,
            vec!["https://x/b.jpg", "http://x/a.jpg", "data:image/png;base64,aGVsbG8="]
        );
    }

    #[test]
    fn test_filter_candidates_all_invalid() {
        assert!(filter_candidates(vec!["nope".into(), "".into()]).is_empty());
    }

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(endpoint("http://127.0.0.1:5000/", "/api/status"), "http://127.0.0.1:5000/api/status");
        assert_eq!(endpoint("http://host:8080", "/api/compare-faces"), "http://host:8080/api/compare-faces");
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "facematch",
            "--server",
            "http://10.0.0.5:5000",
            "compare",
            "--image",
            "me.jpg",
            "https://x/a.jpg",
            "https://x/b.jpg",
        ])
        .unwrap();
        assert_eq!(cli.server, "http://10.0.0.5:5000");
        assert_eq!(cli.timeout_secs, 30);
        match cli.command {
            Commands::Compare { image, candidates } => {
                assert_eq!(image, "me.jpg");
                assert_eq!(candidates, vec!["https://x/a.jpg", "https://x/b.jpg"]);
            }
            Commands::Status => panic!("expected compare"),
        }
    }

    #[test]
    fn test_response_shapes() {
        let found: MatchResponse =
            serde_json::from_str(r#"{"matchFound":true,"matchedImageUrl":"https://x/a.jpg"}"#).unwrap();
        assert!(found.match_found);
        assert_eq!(found.matched_image_url.as_deref(), Some("https://x/a.jpg"));

        let none: MatchResponse = serde_json::from_str(r#"{"matchFound":false}"#).unwrap();
        assert!(!none.match_found);
        assert!(none.matched_image_url.is_none());
    }
}
