//! Native pre-flight inspection of MEI, MSM and MPM inputs.
//!
//! These checks run before anything is sent to the bridge. They catch documents that are not
//! well-formed XML or carry the wrong root element, so those requests fail with
//! [`ConvertError::InvalidInput`] without a JVM round trip. Deeper validation is left to meico.

use roxmltree::{Document as XmlDocument, ParsingOptions};

use crate::foundation::error::{ConvertError, ConvertResult};
use crate::resolve::{InputRole, ResolvedFile};

/// What a quick scan of an input document found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentSummary {
    /// `<mei>` or `<meiCorpus>` root.
    Mei {
        /// Number of `<mdiv>` (movement) elements.
        movements: usize,
    },
    /// `<msm>` root.
    Msm {
        /// Number of `<part>` elements.
        parts: usize,
        /// Number of `<note>` elements.
        notes: usize,
        /// Number of `<rest>` elements.
        rests: usize,
    },
    /// `<mpm>` root.
    Mpm {
        /// `name` attribute of each `<performance>`, in document order.
        performances: Vec<String>,
    },
}

impl DocumentSummary {
    /// Number of performances (zero for anything that is not an MPM).
    pub fn performance_count(&self) -> usize {
        match self {
            DocumentSummary::Mpm { performances } => performances.len(),
            _ => 0,
        }
    }
}

/// Read `file` and inspect it according to its role.
#[tracing::instrument(skip(file), fields(path = %file.path().display(), role = %file.role()))]
pub fn inspect(file: &ResolvedFile) -> ConvertResult<DocumentSummary> {
    let bytes = std::fs::read(file.path()).map_err(|e| {
        ConvertError::file_not_found(format!(
            "cannot read {} input file '{}': {e}",
            file.role(),
            file.path().display()
        ))
    })?;
    inspect_bytes(&bytes, file.role())
}

/// Inspect an in-memory document.
pub fn inspect_bytes(bytes: &[u8], role: InputRole) -> ConvertResult<DocumentSummary> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ConvertError::invalid_input(format!("{role} file is not valid UTF-8: {e}")))?;
    if text.trim().is_empty() {
        return Err(ConvertError::invalid_input(format!("{role} file is empty")));
    }

    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = XmlDocument::parse_with_options(text, opts)
        .map_err(|e| ConvertError::invalid_input(format!("{role} file is not valid: {e}")))?;
    let root = doc.root_element();
    let root_name = root.tag_name().name();

    let count = |name: &str| {
        root.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == name)
            .count()
    };

    match (role, root_name) {
        (InputRole::Mei, "mei" | "meiCorpus") => Ok(DocumentSummary::Mei {
            movements: count("mdiv"),
        }),
        (InputRole::Msm, "msm") => Ok(DocumentSummary::Msm {
            parts: count("part"),
            notes: count("note"),
            rests: count("rest"),
        }),
        (InputRole::Mpm, "mpm") => {
            let performances = root
                .descendants()
                .filter(|n| n.is_element() && n.tag_name().name() == "performance")
                .map(|n| n.attribute("name").unwrap_or_default().to_owned())
                .collect();
            Ok(DocumentSummary::Mpm { performances })
        }
        (_, other) => Err(ConvertError::invalid_input(format!(
            "{role} file is not valid: unexpected root element <{other}>"
        ))),
    }
}
