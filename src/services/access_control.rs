//! Access control for the slideshow.
//!
//! Decides which images a requester may see. Pure: no I/O, no clock.

use crate::models::{image::Image, session::Session};
use thiserror::Error;

/// Who is asking, as far as image visibility is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequesterContext {
    /// Any role-authenticated session; sees everything.
    Admin,
    /// A PIN access account limited to its assigned folders.
    PinRestricted { assigned_folders: Vec<String> },
    /// No session. The slideshow is public, so nothing is filtered.
    Unauthenticated,
}

impl RequesterContext {
    /// Derive the context from an optional session.
    ///
    /// A role login always wins over a PIN account stored in the same
    /// session, and a PIN account without assigned folders is unrestricted.
    pub fn from_session(session: Option<&Session>) -> Self {
        let Some(session) = session else {
            return RequesterContext::Unauthenticated;
        };
        if session.is_authenticated() {
            return RequesterContext::Admin;
        }
        match &session.access_account {
            Some(account) if !account.assigned_folders.is_empty() => {
                RequesterContext::PinRestricted {
                    assigned_folders: account.assigned_folders.clone(),
                }
            }
            Some(_) => RequesterContext::Admin,
            None => RequesterContext::Unauthenticated,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("No images found")]
    NoImagesFound,
    #[error("No images accessible with your account permissions")]
    AccessRestricted,
    #[error("No images found in folder: {0}")]
    FolderEmpty(String),
}

/// True when `folder` equals `scope` or lies beneath it.
///
/// `familyreunion` is not inside `family`: a prefix only counts when it is
/// followed by a separator.
pub fn folder_in_scope(folder: &str, scope: &str) -> bool {
    let scope = scope.trim_matches('/');
    if folder == scope {
        return true;
    }
    !scope.is_empty()
        && folder.len() > scope.len()
        && folder.starts_with(scope)
        && folder.as_bytes()[scope.len()] == b'/'
}

/// Compute the pool of images `requester` may draw from.
///
/// The account filter runs first, then the optional explicit folder filter;
/// an empty result at each stage is reported with its own error so clients
/// can tell "nothing permitted" from "nothing in that folder".
pub fn resolve_eligible_images(
    all_images: &[Image],
    requester: &RequesterContext,
    folder_filter: Option<&str>,
) -> Result<Vec<Image>, AccessError> {
    if all_images.is_empty() {
        return Err(AccessError::NoImagesFound);
    }

    let mut eligible: Vec<Image> = match requester {
        RequesterContext::PinRestricted { assigned_folders } => {
            let allowed: Vec<&str> = assigned_folders
                .iter()
                .map(|f| f.trim_matches('/'))
                .filter(|f| !f.is_empty())
                .collect();
            let permitted: Vec<Image> = all_images
                .iter()
                .filter(|img| allowed.iter().any(|scope| folder_in_scope(&img.folder, scope)))
                .cloned()
                .collect();
            if permitted.is_empty() {
                return Err(AccessError::AccessRestricted);
            }
            permitted
        }
        RequesterContext::Admin | RequesterContext::Unauthenticated => all_images.to_vec(),
    };

    if let Some(filter) = folder_filter.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        eligible.retain(|img| folder_in_scope(&img.folder, filter));
        if eligible.is_empty() {
            return Err(AccessError::FolderEmpty(filter.to_string()));
        }
    }

    Ok(eligible)
}
