//! Image upload checks and media folder naming.
//!
//! Images themselves live on an external media host; GeoReport only decides
//! whether a file may be sent there and which folder it belongs in.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const SLUG_MAX: usize = 50;

/// Accepted image types and the extensions each may carry.
const ACCEPTED: &[(&str, &[&str])] = &[
  ("image/jpeg", &["jpg", "jpeg"]),
  ("image/png", &["png"]),
  ("image/webp", &["webp"]),
  ("image/gif", &["gif"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UploadRejection {
  Empty,
  TooLarge { size: u64, max: u64 },
  UnsupportedType { content_type: String },
  ExtensionMismatch { extension: String, content_type: String },
}

impl fmt::Display for UploadRejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Empty => write!(f, "file is empty"),
      Self::TooLarge { size, max } => {
        write!(f, "file is {size} bytes; the limit is {max}")
      }
      Self::UnsupportedType { content_type } => {
        write!(f, "{content_type} is not an accepted image type")
      }
      Self::ExtensionMismatch { extension, content_type } => {
        write!(f, "extension .{extension} does not match {content_type}")
      }
    }
  }
}

impl std::error::Error for UploadRejection {}

/// Check that a file may be uploaded as a reporte image.
pub fn validate_file_upload(
  file_name: &str,
  size: u64,
  content_type: &str,
) -> Result<(), UploadRejection> {
  if size == 0 {
    return Err(UploadRejection::Empty);
  }
  if size > MAX_UPLOAD_BYTES {
    return Err(UploadRejection::TooLarge { size, max: MAX_UPLOAD_BYTES });
  }

  let content_type = content_type.trim().to_ascii_lowercase();
  let Some((_, extensions)) = ACCEPTED.iter().find(|(t, _)| *t == content_type)
  else {
    return Err(UploadRejection::UnsupportedType { content_type });
  };

  let extension = file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();
  if !extensions.contains(&extension.as_str()) {
    return Err(UploadRejection::ExtensionMismatch { extension, content_type });
  }
  Ok(())
}

/// Folder for images of a reporte that has not been saved yet.
pub fn new_reporte_folder(
  titulo: &str,
  latitud: f64,
  longitud: f64,
  timestamp: i64,
) -> String {
  format!(
    "reportes/{}_{latitud:.6}_{longitud:.6}_{timestamp}",
    slugify(titulo)
  )
}

/// Folder for images added to an existing reporte.
pub fn update_folder(id: Uuid) -> String { format!("reportes/{id}") }

fn slugify(text: &str) -> String {
  let mut slug = String::with_capacity(text.len().min(SLUG_MAX));
  let mut gap = false;
  for ch in text.chars() {
    if ch.is_ascii_alphanumeric() {
      if gap && !slug.is_empty() {
        slug.push('-');
      }
      gap = false;
      slug.push(ch.to_ascii_lowercase());
    } else {
      gap = true;
    }
    if slug.len() >= SLUG_MAX {
      break;
    }
  }
  slug.truncate(SLUG_MAX);
  let slug = slug.trim_end_matches('-').to_string();
  if slug.is_empty() { "reporte".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_matching_image() {
    assert!(validate_file_upload("foto.JPG", 2048, "image/jpeg").is_ok());
    assert!(validate_file_upload("mapa.webp", 1, "image/webp").is_ok());
  }

  #[test]
  fn rejects_oversized() {
    let err = validate_file_upload("a.png", MAX_UPLOAD_BYTES + 1, "image/png")
      .unwrap_err();
    assert!(matches!(err, UploadRejection::TooLarge { .. }));
    assert!(
      validate_file_upload("a.png", MAX_UPLOAD_BYTES, "image/png").is_ok()
    );
  }

  #[test]
  fn rejects_other_types_and_mismatches() {
    assert_eq!(
      validate_file_upload("doc.pdf", 10, "application/pdf"),
      Err(UploadRejection::UnsupportedType {
        content_type: "application/pdf".into(),
      })
    );
    assert!(matches!(
      validate_file_upload("foto.png", 10, "image/jpeg"),
      Err(UploadRejection::ExtensionMismatch { .. })
    ));
    assert_eq!(
      validate_file_upload("foto.png", 0, "image/png"),
      Err(UploadRejection::Empty)
    );
  }

  #[test]
  fn new_folder_has_slug_and_coordinates() {
    let folder =
      new_reporte_folder("Bache en Av. Central!", 9.9281, -84.0907, 1_700_000_000);
    assert_eq!(
      folder,
      "reportes/bache-en-av-central_9.928100_-84.090700_1700000000"
    );
  }

  #[test]
  fn slug_is_bounded_and_never_empty() {
    let long = "x".repeat(80);
    assert_eq!(slugify(&long).len(), SLUG_MAX);
    assert_eq!(slugify("¡¿!?"), "reporte");
    assert_eq!(slugify("  Fuga  de agua  "), "fuga-de-agua");
  }

  #[test]
  fn update_folder_uses_id() {
    assert_eq!(update_folder(Uuid::nil()), format!("reportes/{}", Uuid::nil()));
  }
}
