/// Part names and relative references within a package.
///
/// A `PackURI` is the absolute, slash-prefixed name of a part
/// (`/word/document.xml`). Archive entries and tree paths use the same name
/// without the leading slash, which `membername()` returns.
use crate::ooxml::opc::error::{OpcError, Result};

/// The package pseudo-partname, the source of the package-level relationships.
pub const PACKAGE_URI: &str = "/";

/// Archive path of the content-type declarations.
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

/// Archive path of the package-level relationships.
pub const PACKAGE_RELS_PATH: &str = "_rels/.rels";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackURI {
    uri: String,
}

impl PackURI {
    /// Create a PackURI; the string must begin with a forward slash.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self> {
        let uri = uri.into();
        if !uri.starts_with('/') {
            return Err(OpcError::InvalidPackUri(format!(
                "PackURI must begin with slash, got '{uri}'"
            )));
        }
        Ok(Self { uri })
    }

    /// Create a PackURI from an archive/tree path such as `word/document.xml`.
    pub fn from_membername(membername: &str) -> Self {
        Self {
            uri: format!("/{}", membername.trim_start_matches('/')),
        }
    }

    /// Resolve a relationship target (`../media/image1.png`) against the
    /// directory of its source part (`/word`).
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self> {
        let joined = if relative_ref.starts_with('/') {
            relative_ref.to_string()
        } else if base_uri.ends_with('/') {
            format!("{base_uri}{relative_ref}")
        } else {
            format!("{base_uri}/{relative_ref}")
        };
        Self::new(normalize_path(&joined))
    }

    /// Directory portion: `/word` for `/word/document.xml`, `/` for top-level
    /// parts and for the package itself.
    pub fn base_uri(&self) -> &str {
        match self.uri.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.uri[..pos],
        }
    }

    pub fn filename(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or("")
    }

    /// Extension without the leading period, or "" when there is none.
    pub fn ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    /// The name with the leading slash stripped; "" for the package itself.
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    /// Reference to this part relative to `base_uri`, as written in a
    /// relationship `Target`.
    ///
    /// ```
    /// use quince::ooxml::opc::PackURI;
    /// let uri = PackURI::new("/word/media/image1.png").unwrap();
    /// assert_eq!(uri.relative_ref("/word"), "media/image1.png");
    /// assert_eq!(uri.relative_ref("/word/glossary"), "../media/image1.png");
    /// ```
    pub fn relative_ref(&self, base_uri: &str) -> String {
        if base_uri == "/" {
            return self.membername().to_string();
        }

        let from: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let to: Vec<&str> = self.uri.split('/').filter(|s| !s.is_empty()).collect();
        let common = from
            .iter()
            .zip(to.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut segments: Vec<&str> = vec![".."; from.len() - common];
        segments.extend_from_slice(&to[common..]);
        segments.join("/")
    }

    /// The relationships part belonging to this part:
    /// `/word/_rels/document.xml.rels` for `/word/document.xml`.
    pub fn rels_uri(&self) -> PackURI {
        let base = self.base_uri();
        let uri = if base == "/" {
            format!("/_rels/{}.rels", self.filename())
        } else {
            format!("{}/_rels/{}.rels", base, self.filename())
        };
        PackURI { uri }
    }

    /// Inverse of [`rels_uri`](Self::rels_uri): the part a relationships
    /// file belongs to, or `None` if the name is not a relationships part.
    ///
    /// `_rels/.rels` belongs to the package itself (`/`).
    pub fn source_of_rels(rels_membername: &str) -> Option<PackURI> {
        let rels = Self::from_membername(rels_membername);
        let source_name = rels.filename().strip_suffix(".rels")?;
        let rels_dir = rels.base_uri();
        let source_dir = if rels_dir == "/_rels" {
            ""
        } else {
            rels_dir.strip_suffix("/_rels")?
        };
        Some(PackURI {
            uri: format!("{source_dir}/{source_name}"),
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

/// Resolve `.` and `..` segments and collapse repeated slashes.
/// `..` above the root is dropped.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

impl std::fmt::Display for PackURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}
