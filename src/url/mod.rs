use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};

/// Directory, relative to a deployment root, that holds computed metrics.
pub const CALCULATIONS_DIR: &str = "calculations/";

/// Where metric documents are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A base URL; always ends with `/` so relative paths join beneath it.
    Http(Url),
    /// A local `calculations/` directory.
    Dir(PathBuf),
}

impl Source {
    /// Parse a configured source. `http(s)://` and `file://` are URLs;
    /// anything else is a filesystem path.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::UrlParse("empty source".into()));
        }
        if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input)?;
            return Ok(Source::Http(as_directory(url)));
        }
        if input.starts_with("file://") {
            let url = Url::parse(input)?;
            let path = url
                .to_file_path()
                .map_err(|_| Error::UrlParse(format!("not a local file URL: {input}")))?;
            return Ok(Source::Dir(path));
        }
        Ok(Source::Dir(PathBuf::from(input)))
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Http(url) => write!(f, "{url}"),
            Source::Dir(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Ensure the URL path ends with `/`.
fn as_directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// The deployment root implied by a page path, if recognisable.
///
/// Pages are served from `public/`, either at the site root or under a
/// `/dora/` prefix.
pub fn detect_base_path(path: &str) -> Option<&'static str> {
    if path.contains("/dora/public") {
        Some("/dora/")
    } else if path.contains("/public") {
        Some("/")
    } else {
        None
    }
}

/// Candidate `calculations/` base URLs for a dashboard page, most likely
/// first: the detected deployment root, then relative to the page's parent,
/// then relative to the page itself. Duplicates are removed.
pub fn candidate_bases(page_url: &str) -> Result<Vec<Url>> {
    let page = Url::parse(page_url)?;
    let mut out: Vec<Url> = Vec::new();
    let mut push = |url: Url| {
        if !out.contains(&url) {
            out.push(url);
        }
    };

    if let Some(base) = detect_base_path(page.path()) {
        push(page.join(base)?.join(CALCULATIONS_DIR)?);
    }
    push(page.join("../")?.join(CALCULATIONS_DIR)?);
    push(page.join("./")?.join(CALCULATIONS_DIR)?);

    Ok(out)
}
