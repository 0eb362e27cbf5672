//! Server Types – Routes
//! =====================
//!
//! Scripted HTTP endpoints that the web-server config realises. Each route is
//! an exact path plus one canned behaviour; the table keeps insertion order so
//! the generated config is stable from run to run.
//!
//! Every string in a route ends up inside an nginx quoted string or regex, so
//! values are restricted to characters that cannot terminate either.

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Header used by the standard header echo / check routes.
pub const TEST_HEADER: &str = "X-Harness-Test";
/// Cookie used by the standard cookie echo / check routes.
pub const TEST_COOKIE: &str = "harness";
/// Value expected in both of the above.
pub const TEST_VALUE: &str = "TEST";
/// Prefix the client's default `User-Agent` is expected to carry.
pub const DEFAULT_UA_PREFIX: &str = "service-harness";
pub const CUSTOM_UA: &str = "Mozilla like gecko";
pub const BASIC_USER: &str = "scott";
pub const BASIC_PASSWORD: &str = "tiger";
pub const BEARER_TOKEN: &str = "123456";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteBehavior {
    /// 302 to `/`.
    RedirectToRoot,
    /// 302 to the route's own path, forever.
    RedirectLoop,
    /// 200 with the header set and `{"status":true}`.
    HeaderEcho { name: String, value: String },
    /// 200 `{"status":true}` when the request header matches, else 403.
    HeaderCheck { name: String, value: String },
    /// 200 with `Set-Cookie: name=value`.
    CookieEcho { name: String, value: String },
    /// 200 when the request cookie matches, else 403.
    CookieCheck { name: String, value: String },
    /// 200 `OK` for one verb, 405 with `Allow` for every other.
    MethodOnly(HttpMethod),
    /// 204 with `Allow: <methods>` for OPTIONS.
    OptionsResponder { allow: Vec<HttpMethod> },
    /// 200 when `User-Agent` equals the value, else 403.
    UserAgentExact(String),
    /// 200 when `User-Agent` starts with the value, else 403.
    UserAgentPrefix(String),
    /// 200 for matching Basic credentials, else 401 with a challenge.
    BasicAuth { user: String, password: String },
    /// 200 for a matching Bearer token, else 401 with a challenge.
    BearerAuth { token: String },
}

impl RouteBehavior {
    fn validate(&self) -> HarnessResult<()> {
        match self {
            Self::RedirectToRoot | Self::RedirectLoop | Self::MethodOnly(_) => Ok(()),
            Self::HeaderEcho { name, value } | Self::HeaderCheck { name, value } => {
                check_token("header name", name)?;
                check_value("header value", value)
            }
            Self::CookieEcho { name, value } | Self::CookieCheck { name, value } => {
                check_token("cookie name", name)?;
                check_value("cookie value", value)
            }
            Self::OptionsResponder { allow } => {
                if allow.is_empty() {
                    return Err(HarnessError::InvalidConfig {
                        field: "route allow list",
                        reason: "cannot be empty".into(),
                    });
                }
                Ok(())
            }
            Self::UserAgentExact(ua) | Self::UserAgentPrefix(ua) => check_value("user agent", ua),
            Self::BasicAuth { user, password } => {
                check_value("basic auth user", user)?;
                check_value("basic auth password", password)?;
                if user.contains(':') {
                    return Err(HarnessError::InvalidConfig {
                        field: "basic auth user",
                        reason: "cannot contain ':'".into(),
                    });
                }
                Ok(())
            }
            Self::BearerAuth { token } => check_value("bearer token", token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub behavior: RouteBehavior,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoint set an HTTP client suite exercises.
    pub fn standard() -> Self {
        use HttpMethod::*;
        use RouteBehavior::*;

        let header = || (TEST_HEADER.to_string(), TEST_VALUE.to_string());
        let cookie = || (TEST_COOKIE.to_string(), TEST_VALUE.to_string());
        let routes = [
            ("/redirect/root", RedirectToRoot),
            ("/redirect/loop", RedirectLoop),
            ("/headers/get", {
                let (name, value) = header();
                HeaderEcho { name, value }
            }),
            ("/headers/check", {
                let (name, value) = header();
                HeaderCheck { name, value }
            }),
            ("/cookies/get", {
                let (name, value) = cookie();
                CookieEcho { name, value }
            }),
            ("/cookies/check", {
                let (name, value) = cookie();
                CookieCheck { name, value }
            }),
            ("/delete", MethodOnly(Delete)),
            ("/post", MethodOnly(Post)),
            ("/put", MethodOnly(Put)),
            ("/patch", MethodOnly(Patch)),
            ("/options", OptionsResponder {
                allow: vec![Options, Get, Head],
            }),
            ("/ua/default", UserAgentPrefix(DEFAULT_UA_PREFIX.into())),
            ("/ua/custom", UserAgentExact(CUSTOM_UA.into())),
            ("/auth/basic", BasicAuth {
                user: BASIC_USER.into(),
                password: BASIC_PASSWORD.into(),
            }),
            ("/auth/bearer", BearerAuth {
                token: BEARER_TOKEN.into(),
            }),
        ];
        Self {
            routes: routes
                .into_iter()
                .map(|(path, behavior)| Route {
                    path: path.into(),
                    behavior,
                })
                .collect(),
        }
    }

    /// Appends a route after validating it.
    pub fn push(&mut self, path: impl Into<String>, behavior: RouteBehavior) -> HarnessResult<()> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(HarnessError::InvalidConfig {
                field: "route path",
                reason: format!("{path:?} must start with '/'"),
            });
        }
        if path == "/" {
            return Err(HarnessError::InvalidConfig {
                field: "route path",
                reason: "'/' is reserved for the document root".into(),
            });
        }
        if path.chars().any(|c| c.is_whitespace()) {
            return Err(HarnessError::InvalidConfig {
                field: "route path",
                reason: format!("{path:?} contains whitespace"),
            });
        }
        check_value("route path", &path)?;
        if self.get(&path).is_some() {
            return Err(HarnessError::InvalidConfig {
                field: "route path",
                reason: format!("{path:?} is already routed"),
            });
        }
        behavior.validate()?;
        self.routes.push(Route { path, behavior });
        Ok(())
    }

    /// Builder-style [`Self::push`].
    pub fn with(mut self, path: impl Into<String>, behavior: RouteBehavior) -> HarnessResult<Self> {
        self.push(path, behavior)?;
        Ok(self)
    }

    pub fn get(&self, path: &str) -> Option<&RouteBehavior> {
        self.routes
            .iter()
            .find(|r| r.path == path)
            .map(|r| &r.behavior)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn check_token(field: &'static str, s: &str) -> HarnessResult<()> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(HarnessError::InvalidConfig {
            field,
            reason: format!("{s:?} must be non-empty [A-Za-z0-9_-]"),
        });
    }
    Ok(())
}

fn check_value(field: &'static str, s: &str) -> HarnessResult<()> {
    if let Some(bad) = s
        .chars()
        .find(|c| c.is_control() || matches!(c, '"' | '\'' | '\\' | '$' | ';' | '{' | '}'))
    {
        return Err(HarnessError::InvalidConfig {
            field,
            reason: format!("{bad:?} is not allowed in {s:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_valid_and_ordered() {
        let std_table = RouteTable::standard();
        let mut rebuilt = RouteTable::new();
        for route in std_table.iter() {
            rebuilt
                .push(route.path.clone(), route.behavior.clone())
                .unwrap();
        }
        assert_eq!(rebuilt, std_table);
        assert_eq!(std_table.iter().next().unwrap().path, "/redirect/root");
        assert_eq!(
            std_table.get("/delete"),
            Some(&RouteBehavior::MethodOnly(HttpMethod::Delete))
        );
        assert!(std_table.get("/nope").is_none());
    }

    #[test]
    fn bad_routes_are_rejected() {
        struct Case {
            path: &'static str,
            behavior: RouteBehavior,
            field: &'static str,
        }
        let cases = vec![
            Case {
                path: "relative",
                behavior: RouteBehavior::RedirectLoop,
                field: "route path",
            },
            Case {
                path: "/",
                behavior: RouteBehavior::RedirectLoop,
                field: "route path",
            },
            Case {
                path: "/a b",
                behavior: RouteBehavior::RedirectLoop,
                field: "route path",
            },
            Case {
                path: "/x;",
                behavior: RouteBehavior::RedirectLoop,
                field: "route path",
            },
            Case {
                path: "/h",
                behavior: RouteBehavior::HeaderEcho {
                    name: "X Bad".into(),
                    value: "v".into(),
                },
                field: "header name",
            },
            Case {
                path: "/h",
                behavior: RouteBehavior::HeaderCheck {
                    name: "X-Ok".into(),
                    value: "a\"b".into(),
                },
                field: "header value",
            },
            Case {
                path: "/ua",
                behavior: RouteBehavior::UserAgentExact("curl/$version".into()),
                field: "user agent",
            },
            Case {
                path: "/auth",
                behavior: RouteBehavior::BasicAuth {
                    user: "a:b".into(),
                    password: "c".into(),
                },
                field: "basic auth user",
            },
            Case {
                path: "/opts",
                behavior: RouteBehavior::OptionsResponder { allow: vec![] },
                field: "route allow list",
            },
        ];
        for case in cases {
            match RouteTable::new().with(case.path, case.behavior.clone()) {
                Err(HarnessError::InvalidConfig { field, .. }) => {
                    assert_eq!(field, case.field, "{} {:?}", case.path, case.behavior)
                }
                other => panic!("{}: expected InvalidConfig, got {other:?}", case.path),
            }
        }
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let table = RouteTable::new()
            .with("/once", RouteBehavior::RedirectToRoot)
            .unwrap();
        assert!(table.with("/once", RouteBehavior::RedirectLoop).is_err());
    }
}
