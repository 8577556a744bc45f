//! Request fingerprints used to find a bucket before the service has
//! revealed one.

use std::fmt::{Display, Formatter, Result as FmtResult, Write};

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    /// DELETE method.
    Delete,
    /// GET method.
    Get,
    /// PATCH method.
    Patch,
    /// POST method.
    Post,
    /// PUT method.
    Put,
}

impl Method {
    /// Name of the method.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// Lookup a method from its name.
    ///
    /// Returns `None` for methods the service's API doesn't use.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "DELETE" => Self::Delete,
            "GET" => Self::Get,
            "PATCH" => Self::Patch,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            _ => return None,
        })
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Resources whose first ID is significant for ratelimiting.
///
/// A route like `channels/{x}/messages/{y}` shares its budget with every
/// other request on the same `{x}` regardless of `{y}`, so `{x}` stays
/// literal in the fingerprint while `{y}` is templated away.
const TOP_LEVEL_RESOURCES: [&str; 3] = ["channels", "guilds", "webhooks"];

/// A request fingerprint: the method and the templated route.
///
/// Two requests with the same fingerprint share a ratelimit budget. The
/// fingerprint is computed purely from the request; the service's own bucket
/// IDs are only learned from response headers afterwards.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Path {
    method: Method,
    route: Box<str>,
}

impl Path {
    /// Compute the fingerprint of a request.
    ///
    /// The route may carry a leading slash and a query string; both are
    /// ignored. The first significant resource ID is kept literal, all later
    /// IDs are replaced with a placeholder. Webhook tokens are treated as
    /// IDs.
    #[must_use]
    pub fn new(method: Method, route: &str) -> Self {
        let route = route.trim_start_matches('/');
        let route = route.split('?').next().unwrap_or(route);

        let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        let mut template = String::with_capacity(route.len());

        for (idx, segment) in segments.iter().enumerate() {
            if idx > 0 {
                template.push('/');
            }

            // A webhook token sits right after the webhook ID and buckets
            // like an ID even though it isn't numeric.
            let webhook_token = idx == 2 && segments[0] == "webhooks";
            let is_id = webhook_token || segment.bytes().all(|b| b.is_ascii_digit());

            if is_id {
                let significant = idx == 1 && TOP_LEVEL_RESOURCES.contains(&segments[0]);

                if significant {
                    template.push_str(segment);
                } else {
                    template.push_str(":id");
                }
            } else {
                template.push_str(segment);
            }
        }

        Self {
            method,
            route: template.into_boxed_str(),
        }
    }

    /// Method of the request.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Templated route of the request.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.method.name())?;
        f.write_char(' ')?;

        f.write_str(&self.route)
    }
}

#[cfg(test)]
mod tests {
    use super::{Method, Path};
    use static_assertions::assert_impl_all;
    use std::{fmt::Debug, hash::Hash};

    assert_impl_all!(Method: Clone, Copy, Debug, Eq, Hash, PartialEq, Send, Sync);
    assert_impl_all!(Path: Clone, Debug, Eq, Hash, PartialEq, Send, Sync);

    #[test]
    fn keeps_first_significant_id() {
        let path = Path::new(Method::Post, "/channels/123/messages");
        assert_eq!("channels/123/messages", path.route());

        let path = Path::new(Method::Get, "channels/123/messages/456");
        assert_eq!("channels/123/messages/:id", path.route());

        let path = Path::new(Method::Patch, "/guilds/9/members/8/roles/7");
        assert_eq!("guilds/9/members/:id/roles/:id", path.route());
    }

    #[test]
    fn same_parent_shares_fingerprint() {
        let a = Path::new(Method::Get, "/channels/123/messages/456");
        let b = Path::new(Method::Get, "/channels/123/messages/789");
        let c = Path::new(Method::Get, "/channels/124/messages/456");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn method_distinguishes() {
        let get = Path::new(Method::Get, "/channels/123/messages/456");
        let delete = Path::new(Method::Delete, "/channels/123/messages/456");

        assert_ne!(get, delete);
    }

    #[test]
    fn no_top_level_id() {
        let path = Path::new(Method::Get, "/users/@me/guilds");
        assert_eq!("users/@me/guilds", path.route());

        let path = Path::new(Method::Get, "/users/123/guilds");
        assert_eq!("users/:id/guilds", path.route());

        let path = Path::new(Method::Get, "/gateway/bot");
        assert_eq!("gateway/bot", path.route());
    }

    #[test]
    fn webhook_token_is_an_id() {
        let path = Path::new(Method::Post, "/webhooks/123/aBcDeF-gH");
        assert_eq!("webhooks/123/:id", path.route());
    }

    #[test]
    fn query_string_ignored() {
        let a = Path::new(Method::Get, "/channels/1/messages?limit=100");
        let b = Path::new(Method::Get, "/channels/1/messages");

        assert_eq!(a, b);
    }
}
