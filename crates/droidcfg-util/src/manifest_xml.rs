//! Minimal `AndroidManifest.xml` reading.

use std::path::Path;

use crate::error::UtilError;

const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// Facts read from an `AndroidManifest.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFacts {
    /// Legacy `package` attribute on `<manifest>`, if still present.
    pub package: Option<String>,
    /// `android:label` of the `<application>` element.
    pub application_label: Option<String>,
    /// Whether any activity declares the `MAIN` action.
    pub has_launcher_activity: bool,
}

/// Parse manifest facts from XML text.
///
/// # Errors
/// Returns an error if the document is not well-formed XML or the root element
/// is not `<manifest>`.
pub fn parse_manifest(xml: &str, origin: &str) -> Result<ManifestFacts, UtilError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| UtilError::Xml {
        path: origin.to_owned(),
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "manifest" {
        return Err(UtilError::Xml {
            path: origin.to_owned(),
            message: format!("root element is <{}>, expected <manifest>", root.tag_name().name()),
        });
    }

    let package = root.attribute("package").map(str::to_owned);
    let application = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "application");
    let application_label = application
        .and_then(|app| app.attribute((ANDROID_NS, "label")))
        .map(str::to_owned);
    let has_launcher_activity = root.descendants().any(|n| {
        n.is_element()
            && n.tag_name().name() == "action"
            && n.attribute((ANDROID_NS, "name")) == Some("android.intent.action.MAIN")
    });

    Ok(ManifestFacts {
        package,
        application_label,
        has_launcher_activity,
    })
}

/// Read manifest facts from a file. Returns `None` if the file does not exist.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_manifest(path: &Path) -> Result<Option<ManifestFacts>, UtilError> {
    if !path.exists() {
        return Ok(None);
    }
    let xml = crate::fs::read_to_string(path)?;
    parse_manifest(&xml, &path.display().to_string()).map(Some)
}
