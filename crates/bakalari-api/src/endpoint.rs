//! Endpoint descriptors
//!
//! Every remote operation the client knows about, each with a fixed path (or
//! absolute URL) and HTTP method.

use std::str::FromStr;

use reqwest::Method;

use crate::error::{Error, Result};

/// Named Bakalari operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Version,
    Login,
    /// School directory, hosted outside the school's own server
    SchoolList,
    KomensUnread,
    KomensUnreadCount,
    KomensAttachment,
    Marks,
    TimetableActual,
    TimetablePermanent,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Version,
        Endpoint::Login,
        Endpoint::SchoolList,
        Endpoint::KomensUnread,
        Endpoint::KomensUnreadCount,
        Endpoint::KomensAttachment,
        Endpoint::Marks,
        Endpoint::TimetableActual,
        Endpoint::TimetablePermanent,
    ];

    /// Short kebab-case name, as accepted by `FromStr`.
    pub const fn name(self) -> &'static str {
        match self {
            Endpoint::Version => "version",
            Endpoint::Login => "login",
            Endpoint::SchoolList => "school-list",
            Endpoint::KomensUnread => "komens-unread",
            Endpoint::KomensUnreadCount => "komens-unread-count",
            Endpoint::KomensAttachment => "komens-attachment",
            Endpoint::Marks => "marks",
            Endpoint::TimetableActual => "timetable-actual",
            Endpoint::TimetablePermanent => "timetable-permanent",
        }
    }

    /// Relative path or absolute URL.
    pub const fn path(self) -> &'static str {
        match self {
            Endpoint::Version => "/api",
            Endpoint::Login => "/api/login",
            Endpoint::SchoolList => "https://sluzby.bakalari.cz/api/v1/municipality",
            Endpoint::KomensUnread => "/api/3/komens/messages/received",
            Endpoint::KomensUnreadCount => "/api/3/komens/messages/received/unread",
            Endpoint::KomensAttachment => "/api/3/komens/attachment",
            Endpoint::Marks => "/api/3/marks",
            Endpoint::TimetableActual => "/api/3/timetable/actual",
            Endpoint::TimetablePermanent => "/api/3/timetable/permanent",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Endpoint::Login | Endpoint::KomensUnread => Method::POST,
            Endpoint::Version
            | Endpoint::SchoolList
            | Endpoint::KomensUnreadCount
            | Endpoint::KomensAttachment
            | Endpoint::Marks
            | Endpoint::TimetableActual
            | Endpoint::TimetablePermanent => Method::GET,
        }
    }

    /// Resolve to a full URL against `server`, appending `extend` if given
    /// (e.g. `/{attachment id}`).
    pub fn resolve(self, server: Option<&str>, extend: Option<&str>) -> Result<String> {
        let mut url = resolve_url(server, self.path())?;
        if let Some(suffix) = extend {
            url.push_str(suffix);
        }
        Ok(url)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Endpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::BadEndpointUrl(format!("unknown endpoint `{name}`")))
    }
}

/// Resolve an arbitrary path or URL against the server base.
///
/// Absolute `http(s)` URLs pass through untouched. Relative paths need a
/// server; without one the result is `BadEndpointUrl`.
pub fn resolve_url(server: Option<&str>, path: &str) -> Result<String> {
    if is_absolute(path) {
        return Ok(path.to_string());
    }

    let url = match server {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path.to_string(),
    };

    if !is_absolute(&url) {
        return Err(Error::BadEndpointUrl(format!("bad endpoint url ({url})")));
    }
    Ok(url)
}

fn is_absolute(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
