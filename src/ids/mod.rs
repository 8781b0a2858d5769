//! Canonical media identifier grammar and URI codec.
//!
//! Every media identifier crossing component boundaries uses one of the
//! normalized families:
//!
//! - `library:<provider>:<kind>:<id>`
//! - `playlist:<provider>:<id>`
//! - `radio:<provider>:<id>`
//! - `library://<kind>/<id>?provider=<p>` (external/legacy form)
//!
//! Segments are URL-encoded so colons inside ids do not split segments.
//! External strings enter only through [`parse_identifier`]; the build
//! functions are the inverse. `normalize`/`denormalize` bridge between the
//! canonical internal form and the vendor-facing `library://` form and
//! round-trip losslessly.

use std::borrow::Cow;
use std::fmt;

/// Library kinds accepted in the `library:` family.
pub const LIBRARY_KINDS: &[&str] = &[
    "album", "artist", "track", "playlist", "radio", "albums", "artists", "tracks",
];

/// Third-party track schemes that normalize into `library:local:track:<scheme>:<id>`.
const FOREIGN_TRACK_SCHEMES: &[&str] = &["apple_music", "tidal", "deezer"];

/// The family a parsed identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFamily {
    Library,
    Playlist,
    Radio,
    Unknown,
}

impl fmt::Display for IdFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Playlist => write!(f, "playlist"),
            Self::Radio => write!(f, "radio"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parsed identifier. `kind` is the media kind (`album`, `track`, `playlist`,
/// `radio`, ...); `provider` and `item_id` are decoded segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identifier {
    pub family: Option<IdFamily>,
    pub kind: Option<String>,
    pub provider: Option<String>,
    pub item_id: Option<String>,
}

impl Identifier {
    pub fn is_empty(&self) -> bool {
        self.family.is_none() && self.kind.is_none() && self.item_id.is_none()
    }
}

/// Percent-decode a segment, degrading to the raw text on malformed input.
fn decode_segment(s: &str) -> String {
    urlencoding::decode(s)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| s.to_string())
}

fn encode_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Parse any of the recognised identifier forms.
///
/// Empty input returns an empty [`Identifier`]. Unrecognised input returns
/// the raw text as `item_id` with `family = Unknown` so callers can still
/// hand it through verbatim.
pub fn parse_identifier(input: &str) -> Identifier {
    let s = input.trim();
    if s.is_empty() {
        return Identifier::default();
    }

    // External/legacy URL form: library://<kind>/<id>?provider=<p>
    if let Some(rest) = s.strip_prefix("library://") {
        return parse_library_url(rest);
    }

    // Canonical colon families. splitn keeps colons inside the id segment.
    let mut parts = s.splitn(2, ':');
    let head = parts.next().unwrap_or_default();
    let tail = parts.next();

    match (head, tail) {
        ("library", Some(rest)) => {
            // library:<provider>:<kind>:<id>
            let mut seg = rest.splitn(3, ':');
            let provider = seg.next().map(decode_segment);
            let kind = seg.next().map(decode_segment);
            let item_id = seg.next().map(decode_segment);
            Identifier {
                family: Some(IdFamily::Library),
                kind,
                provider,
                item_id,
            }
        }
        ("playlist", Some(rest)) => {
            let mut seg = rest.splitn(2, ':');
            let provider = seg.next().map(decode_segment);
            let item_id = seg.next().map(decode_segment);
            Identifier {
                family: Some(IdFamily::Playlist),
                kind: Some("playlist".to_string()),
                provider,
                item_id,
            }
        }
        ("radio", Some(rest)) => {
            let mut seg = rest.splitn(2, ':');
            let provider = seg.next().map(decode_segment);
            let item_id = seg.next().map(decode_segment);
            Identifier {
                family: Some(IdFamily::Radio),
                kind: Some("radio".to_string()),
                provider,
                item_id,
            }
        }
        // Bare <kind>:<provider>:<id> with a known library kind
        (kind, Some(rest)) if LIBRARY_KINDS.contains(&kind) => {
            let mut seg = rest.splitn(2, ':');
            let provider = seg.next().map(decode_segment);
            let item_id = seg.next().map(decode_segment);
            Identifier {
                family: Some(IdFamily::Library),
                kind: Some(kind.to_string()),
                provider,
                item_id,
            }
        }
        _ => Identifier {
            family: Some(IdFamily::Unknown),
            kind: None,
            provider: None,
            item_id: Some(s.to_string()),
        },
    }
}

fn parse_library_url(rest: &str) -> Identifier {
    // <kind>/<id>?provider=<p>
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    let mut seg = path.splitn(2, '/');
    let kind = seg.next().filter(|s| !s.is_empty()).map(decode_segment);
    let item_id = seg.next().filter(|s| !s.is_empty()).map(decode_segment);

    let provider = query.and_then(|q| {
        q.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == "provider").then(|| decode_segment(v))
        })
    });

    Identifier {
        family: Some(IdFamily::Library),
        kind,
        provider,
        item_id,
    }
}

/// Build `library:<provider>:<kind>:<id>` with encoded segments.
pub fn build_library_uri(kind: &str, id: &str, provider: Option<&str>) -> String {
    format!(
        "library:{}:{}:{}",
        encode_segment(provider.unwrap_or("local")),
        encode_segment(kind),
        encode_segment(id)
    )
}

/// Build `playlist:<provider>:<id>` with encoded segments.
pub fn build_playlist_uri(id: &str, provider: Option<&str>) -> String {
    format!(
        "playlist:{}:{}",
        encode_segment(provider.unwrap_or("local")),
        encode_segment(id)
    )
}

/// Build `radio:<provider>:<id>` with encoded segments.
pub fn build_radio_key(provider: &str, id: &str) -> String {
    format!("radio:{}:{}", encode_segment(provider), encode_segment(id))
}

/// Bridge a vendor-facing URI into the canonical internal form.
///
/// - `library://<kind>/<id>?provider=<p>` becomes `library:<p>:<kind>:<id>`
/// - `apple_music://track/X` (and `tidal://`, `deezer://`) becomes
///   `library:local:track:<scheme>:X` and round-trips exactly
/// - Strings already in a canonical family pass through unchanged
pub fn normalize_media_uri(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() {
        return String::new();
    }

    for scheme in FOREIGN_TRACK_SCHEMES {
        if let Some(rest) = s.strip_prefix(&format!("{scheme}://track/")) {
            // Embedded colon is deliberate: the foreign scheme tags the id.
            return format!("library:local:track:{scheme}:{rest}");
        }
    }

    if s.starts_with("library://") {
        let id = parse_identifier(s);
        if let (Some(kind), Some(item)) = (&id.kind, &id.item_id) {
            return build_library_uri(kind, item, id.provider.as_deref());
        }
    }

    s.to_string()
}

/// Inverse of [`normalize_media_uri`]: canonical internal form back to the
/// vendor-facing `library://` form. `denormalize(normalize(x)) == x` for
/// every `x` this system emits.
pub fn denormalize_media_uri(input: &str) -> String {
    let s = input.trim();
    let id = parse_identifier(s);

    if id.family != Some(IdFamily::Library) {
        return s.to_string();
    }

    let (Some(kind), Some(item)) = (&id.kind, &id.item_id) else {
        return s.to_string();
    };

    // library:local:track:<scheme>:X goes back to <scheme>://track/X
    if kind == "track" && id.provider.as_deref() == Some("local") {
        for scheme in FOREIGN_TRACK_SCHEMES {
            if let Some(rest) = item.strip_prefix(&format!("{scheme}:")) {
                return format!("{scheme}://track/{rest}");
            }
        }
    }

    let mut out = format!("library://{}/{}", encode_segment(kind), encode_segment(item));
    if let Some(provider) = &id.provider {
        out.push_str("?provider=");
        out.push_str(&encode_segment(provider));
    }
    out
}

/// Coerce any identifier spelling to the command URI used for
/// "play this playlist". Falls back to `fallback_id` when the input carries
/// no usable id.
pub fn to_playlist_command_uri(
    input: &str,
    provider: Option<&str>,
    fallback_id: Option<&str>,
) -> Option<String> {
    let id = parse_identifier(input);

    let item = id
        .item_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(fallback_id)?;
    let prov = id.provider.as_deref().or(provider);

    match id.family {
        Some(IdFamily::Playlist) => Some(build_playlist_uri(item, prov)),
        Some(IdFamily::Library) if id.kind.as_deref() == Some("playlist") => {
            Some(build_playlist_uri(item, prov))
        }
        // Anything else keeps its identity but is re-keyed as a playlist
        // command when the caller knows it plays as one.
        Some(IdFamily::Unknown) | None => Some(build_playlist_uri(item, prov)),
        _ => None,
    }
}
