//! Role selection from the page location

use crate::{CamlinkError, PeerId};
use tracing::debug;
use url::Url;

/// Which side of the link this session plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRole {
    /// Captures the camera and answers calls
    Broadcaster,
    /// Calls a broadcaster and renders its stream
    Viewer {
        /// Broadcaster identity to connect to
        target: PeerId,
    },
}

impl SessionRole {
    /// Whether this is the viewer role
    pub fn is_viewer(&self) -> bool {
        matches!(self, SessionRole::Viewer { .. })
    }
}

/// Pick the role for a page location.
///
/// The first occurrence of `param` in the query decides: a non-empty value
/// selects [`SessionRole::Viewer`] with that value as the target, anything
/// else selects [`SessionRole::Broadcaster`]. A location that does not parse
/// as a URL is a broadcaster.
pub fn select_role(location: &str, param: &str) -> SessionRole {
    let url = match Url::parse(location) {
        Ok(url) => url,
        Err(e) => {
            debug!("Location {:?} is not a URL ({}), acting as broadcaster", location, e);
            return SessionRole::Broadcaster;
        }
    };

    match url.query_pairs().find(|(key, _)| key == param) {
        Some((_, value)) if !value.is_empty() => SessionRole::Viewer {
            target: PeerId::new(value.into_owned()),
        },
        _ => SessionRole::Broadcaster,
    }
}

/// Parse the page a broadcaster runs on
pub fn parse_page_url(location: &str) -> Result<Url, CamlinkError> {
    Url::parse(location).map_err(|e| CamlinkError::InvalidConfiguration {
        field: "location".to_string(),
        reason: e.to_string(),
    })
}

/// Link a viewer opens to reach the broadcaster `id`.
///
/// Any query or fragment on `page_url` is dropped.
pub fn shareable_link(page_url: &Url, param: &str, id: &PeerId) -> String {
    let mut link = page_url.clone();
    link.set_fragment(None);
    link.set_query(None);
    link.query_pairs_mut().append_pair(param, id.as_str());
    link.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(location: &str) -> Url {
        parse_page_url(location).unwrap()
    }

    #[test]
    fn test_no_query_is_broadcaster() {
        assert_eq!(
            select_role("https://cam.example/", "view"),
            SessionRole::Broadcaster
        );
    }

    #[test]
    fn test_view_param_selects_viewer() {
        let role = select_role("https://cam.example/?view=abc-123", "view");
        assert_eq!(
            role,
            SessionRole::Viewer {
                target: PeerId::new("abc-123")
            }
        );
        assert!(role.is_viewer());
    }

    #[test]
    fn test_empty_value_is_broadcaster() {
        assert_eq!(
            select_role("https://cam.example/?view=", "view"),
            SessionRole::Broadcaster
        );
        assert_eq!(
            select_role("https://cam.example/?view", "view"),
            SessionRole::Broadcaster
        );
    }

    #[test]
    fn test_other_params_are_ignored() {
        assert_eq!(
            select_role("https://cam.example/?mode=viewer&id=x", "view"),
            SessionRole::Broadcaster
        );
        assert_eq!(
            select_role("https://cam.example/?a=1&view=host&b=2", "view"),
            SessionRole::Viewer {
                target: PeerId::new("host")
            }
        );
    }

    #[test]
    fn test_first_occurrence_wins_and_is_decoded() {
        assert_eq!(
            select_role("https://cam.example/?view=a%20b&view=second", "view"),
            SessionRole::Viewer {
                target: PeerId::new("a b")
            }
        );
        assert_eq!(
            select_role("https://cam.example/?view=x+y#frag", "view"),
            SessionRole::Viewer {
                target: PeerId::new("x y")
            }
        );
    }

    #[test]
    fn test_fragment_is_not_part_of_query() {
        assert_eq!(
            select_role("https://cam.example/#?view=abc", "view"),
            SessionRole::Broadcaster
        );
    }

    #[test]
    fn test_shareable_link_strips_query() {
        let id = PeerId::new("3f2a-b");
        assert_eq!(
            shareable_link(&page("https://cam.example/index.html?view=old#top"), "view", &id),
            "https://cam.example/index.html?view=3f2a-b"
        );
    }

    #[test]
    fn test_shareable_link_round_trips_through_role_selection() {
        let id = PeerId::new("id with/slash");
        let link = shareable_link(&page("https://cam.example/"), "view", &id);
        assert_eq!(select_role(&link, "view"), SessionRole::Viewer { target: id });
    }

    #[test]
    fn test_unparseable_location_is_broadcaster() {
        assert_eq!(select_role("not a url?view=abc", "view"), SessionRole::Broadcaster);
        assert!(matches!(
            parse_page_url("not a url"),
            Err(CamlinkError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_link_escapes_reserved_characters() {
        let id = PeerId::new("a&b=c");
        let link = shareable_link(&page("https://cam.example/"), "view", &id);
        assert_eq!(link, "https://cam.example/?view=a%26b%3Dc");
        assert_eq!(select_role(&link, "view"), SessionRole::Viewer { target: id });
    }
}
