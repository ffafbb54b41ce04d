//! Route table and navigation guard.
//!
//! The guard is a pure function of the target route and the session's
//! authenticated flag; [`Router`] applies it on every navigation and
//! follows redirects until a route is allowed.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteName {
    Login,
    Home,
    Chat,
    Library,
    Personal,
    Setting,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteDef {
    pub name: RouteName,
    pub path: &'static str,
    /// `None` means the route did not say; such routes require a session.
    pub requires_auth: Option<bool>,
    pub redirect: Option<RouteName>,
}

pub const ROUTES: &[RouteDef] = &[
    RouteDef {
        name: RouteName::Login,
        path: "/login",
        requires_auth: Some(false),
        redirect: None,
    },
    RouteDef {
        name: RouteName::Home,
        path: "/hello",
        requires_auth: None,
        redirect: Some(RouteName::Chat),
    },
    RouteDef {
        name: RouteName::Chat,
        path: "/hello/chat",
        requires_auth: None,
        redirect: None,
    },
    RouteDef {
        name: RouteName::Library,
        path: "/hello/library",
        requires_auth: None,
        redirect: None,
    },
    RouteDef {
        name: RouteName::Personal,
        path: "/hello/personal",
        requires_auth: None,
        redirect: None,
    },
    RouteDef {
        name: RouteName::Setting,
        path: "/hello/setting",
        requires_auth: None,
        redirect: None,
    },
];

impl RouteName {
    pub fn def(self) -> &'static RouteDef {
        ROUTES
            .iter()
            .find(|route| route.name == self)
            .unwrap_or(&ROUTES[0])
    }

    pub fn path(self) -> &'static str {
        self.def().path
    }

    pub fn requires_auth(self) -> bool {
        self.def().requires_auth != Some(false)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteName::Login => "login",
            RouteName::Home => "home",
            RouteName::Chat => "chat",
            RouteName::Library => "library",
            RouteName::Personal => "personal",
            RouteName::Setting => "setting",
        }
    }
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteName {
    type Err = String;

    /// Accepts a route name (`chat`) or its path (`/hello/chat`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        ROUTES
            .iter()
            .find(|route| route.name.as_str().eq_ignore_ascii_case(value) || route.path == value)
            .map(|route| route.name)
            .ok_or_else(|| {
                let known: Vec<&str> = ROUTES.iter().map(|route| route.name.as_str()).collect();
                format!("Unknown route '{value}'. Known routes: {}", known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(RouteName),
}

pub fn guard(target: RouteName, authenticated: bool) -> GuardDecision {
    if target.requires_auth() && !authenticated {
        GuardDecision::Redirect(RouteName::Login)
    } else if target == RouteName::Login && authenticated {
        GuardDecision::Redirect(RouteName::Home)
    } else {
        GuardDecision::Allow
    }
}

pub trait AuthStatus: Send + Sync {
    fn is_authenticated(&self) -> bool;
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, target: RouteName);
}

pub struct Router {
    auth: Arc<dyn AuthStatus>,
    history: Mutex<Vec<RouteName>>,
}

impl Router {
    pub fn new(auth: Arc<dyn AuthStatus>) -> Self {
        Self {
            auth,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Navigate to `target`, returning the route that was actually entered.
    pub fn push(&self, target: RouteName) -> RouteName {
        let resolved = self.resolve(target);
        debug!(requested = %target, resolved = %resolved, "Navigation");
        self.history().push(resolved);
        resolved
    }

    /// Follow guard and static redirects without recording anything.
    pub fn resolve(&self, target: RouteName) -> RouteName {
        let authenticated = self.auth.is_authenticated();
        let mut current = target;
        // Every hop lands on a distinct route, so the table size bounds the walk.
        for _ in 0..ROUTES.len() {
            let next = match guard(current, authenticated) {
                GuardDecision::Redirect(next) => next,
                GuardDecision::Allow => match current.def().redirect {
                    Some(next) => next,
                    None => break,
                },
            };
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    pub fn current(&self) -> Option<RouteName> {
        self.history().last().copied()
    }

    pub fn visited(&self) -> Vec<RouteName> {
        self.history().clone()
    }

    fn history(&self) -> MutexGuard<'_, Vec<RouteName>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for Router {
    fn navigate(&self, target: RouteName) {
        self.push(target);
    }
}
