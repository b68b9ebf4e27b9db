//! Cache-key normalization.
//!
//! Responsive photo variants (`-320px.jpg`, `-640px.jpg`, ...) and avatar
//! densities (`-1x.jpg`, `-2x.jpg`, ...) collapse to one cache slot per
//! logical image: the suffix is replaced by a bare `.jpg`.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use url::Url;

static PHOTO_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+px\.jpg$").expect("photo variant pattern is valid"));

static AVATAR_DENSITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\dx\.jpg$").expect("avatar density pattern is valid"));

/// `photo-640px.jpg` -> `photo.jpg`; anything else is returned unchanged.
pub fn strip_photo_variant(path: &str) -> Cow<'_, str> {
    PHOTO_VARIANT.replace(path, ".jpg")
}

/// `avatar-2x.jpg` -> `avatar.jpg`; anything else is returned unchanged.
pub fn strip_avatar_density(path: &str) -> Cow<'_, str> {
    AVATAR_DENSITY.replace(path, ".jpg")
}

/// Key a request is stored under when no normalization applies.
pub fn request_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

/// Storage key for a photo request.
pub fn photo_storage_key(url: &Url) -> String {
    with_path(url, strip_photo_variant(url.path()))
}

/// Storage key for an avatar request.
pub fn avatar_storage_key(url: &Url) -> String {
    with_path(url, strip_avatar_density(url.path()))
}

fn with_path(url: &Url, path: Cow<'_, str>) -> String {
    let mut key = url.clone();
    if let Cow::Owned(path) = path {
        key.set_path(&path);
    }
    key.set_fragment(None);
    key.into()
}
