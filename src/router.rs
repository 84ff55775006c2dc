//! Decides what a completed request should do, without touching the DB
//! itself (spec.md §9 REDESIGN FLAG: "the tight coupling between the parser
//! and the DB verifier ... should be inverted"). Grounded on the teacher's
//! `src/router.rs` + `src/handlers/get_handler.rs` shape (a separate module
//! that turns a parsed request into an action), generalized from the
//! teacher's file-serving-only router to also recognize the two auth POST
//! targets spec.md §4.5 names.

use crate::http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTag {
    Register,
    Login,
}

#[derive(Debug)]
pub enum Action<'a> {
    /// Serve the static file at `request.path` as-is.
    Serve,
    /// Run the DB-backed credential check for one of the two known POST
    /// targets (spec.md §4.5 "If the post targets /register.html (tag 0) or
    /// /login.html (tag 1)").
    Authenticate {
        tag: AuthTag,
        username: &'a str,
        password: &'a str,
    },
}

/// Pure function of a completed `Request` — no I/O, no DB handle, so the
/// parser and this router are both unit-testable without a live database
/// (spec.md §9).
pub fn route(request: &Request) -> Action<'_> {
    if request.is_post() {
        let tag = match request.path.as_str() {
            "/register.html" => Some(AuthTag::Register),
            "/login.html" => Some(AuthTag::Login),
            _ => None,
        };
        if let Some(tag) = tag {
            if let (Some(username), Some(password)) =
                (request.form.get("username"), request.form.get("password"))
            {
                return Action::Authenticate {
                    tag,
                    username,
                    password,
                };
            }
        }
    }
    Action::Serve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{parse, Request};
    use crate::buffer::Buffer;

    fn parsed(raw: &[u8]) -> Request {
        let mut req = Request::new();
        let mut buf = Buffer::new();
        buf.append(raw);
        assert!(parse(&mut req, &mut buf));
        req
    }

    #[test]
    fn get_requests_always_serve() {
        let req = parsed(b"GET /index.html HTTP/1.1\r\n\r\n");
        assert!(matches!(route(&req), Action::Serve));
    }

    #[test]
    fn login_post_routes_to_authenticate() {
        let req = parsed(
            b"POST /login.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nusername=a&password=b",
        );
        match route(&req) {
            Action::Authenticate { tag, username, password } => {
                assert_eq!(tag, AuthTag::Login);
                assert_eq!(username, "a");
                assert_eq!(password, "b");
            }
            Action::Serve => panic!("expected Authenticate"),
        }
    }

    #[test]
    fn unrelated_post_serves_instead_of_authenticating() {
        let req = parsed(
            b"POST /upload.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nusername=a&password=b",
        );
        assert!(matches!(route(&req), Action::Serve));
    }
}
