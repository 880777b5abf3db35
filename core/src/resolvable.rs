//! # Resolvable: cached, asynchronously computed dependencies
//!
//! A [`Resolvable`] is a named value a state depends on. It declares the
//! tokens it needs, and a resolver that turns their values into its own.
//!
//! * At most one computation is ever in flight per Resolvable.
//! * Once resolved, every `get` returns the cached value.
//! * A resolver error becomes an Error-kind [`Rejection`] carrying the cause.

use crate::rejection::{Rejection, RejectionDetail};
use crate::resolve_context::ResolveContext;
use crate::trace::TraceEvent;
use futures_util::future::{BoxFuture, FutureExt, Shared, try_join_all};
use futures_util::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The key a dependency is requested by.
pub type Token = String;

/// A resolved dependency value.
pub type Resolved = Arc<dyn Any + Send + Sync>;

/// What a resolver hands back.
pub enum ResolveOutput {
    /// The value is available now.
    Ready(Resolved),
    /// The value is computed later.
    Deferred(BoxFuture<'static, anyhow::Result<Resolved>>),
    /// A stream of values; only the first emission is used.
    Stream(BoxStream<'static, Resolved>),
}

impl ResolveOutput {
    pub fn ready<T: Send + Sync + 'static>(value: T) -> Self {
        ResolveOutput::Ready(Arc::new(value))
    }

    pub fn deferred<F, T>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        ResolveOutput::Deferred(
            future
                .map(|result| result.map(|value| Arc::new(value) as Resolved))
                .boxed(),
        )
    }
}

/// Computes a value from the values of the declared dependencies, in order.
pub type ResolveFn = Arc<dyn Fn(Vec<Resolved>) -> anyhow::Result<ResolveOutput> + Send + Sync>;

/// The pending or settled value of one Resolvable.
pub type ResolveFuture = BoxFuture<'static, Result<Resolved, Rejection>>;

type InFlight = Shared<ResolveFuture>;

/// When a Resolvable is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyWhen {
    /// Before any state is entered.
    Eager,
    /// When its own state is entered.
    Lazy,
}

/// Whether the transition waits for a Resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAsync {
    Wait,
    /// Started, but never waited for.
    NoWait,
    /// Wait for the first emission of the resolver's stream.
    RxWait,
}

/// A partial resolve policy. Unset fields fall back to the state's policy,
/// then to `LAZY` / `WAIT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvePolicy {
    #[serde(default)]
    pub when: Option<PolicyWhen>,
    #[serde(default, rename = "async")]
    pub async_policy: Option<PolicyAsync>,
}

impl ResolvePolicy {
    pub fn new(when: PolicyWhen, async_policy: PolicyAsync) -> Self {
        Self {
            when: Some(when),
            async_policy: Some(async_policy),
        }
    }

    pub fn eager() -> Self {
        Self {
            when: Some(PolicyWhen::Eager),
            async_policy: None,
        }
    }

    pub fn lazy() -> Self {
        Self {
            when: Some(PolicyWhen::Lazy),
            async_policy: None,
        }
    }

    pub fn with_async(mut self, async_policy: PolicyAsync) -> Self {
        self.async_policy = Some(async_policy);
        self
    }

    /// Fill the unset fields of `self` from `fallback`.
    pub fn or(self, fallback: ResolvePolicy) -> Self {
        Self {
            when: self.when.or(fallback.when),
            async_policy: self.async_policy.or(fallback.async_policy),
        }
    }

    pub fn when(&self) -> PolicyWhen {
        self.when.unwrap_or(PolicyWhen::Lazy)
    }

    pub fn async_policy(&self) -> PolicyAsync {
        self.async_policy.unwrap_or(PolicyAsync::Wait)
    }
}

#[derive(Default)]
struct Resolution {
    data: Option<Resolved>,
    in_flight: Option<InFlight>,
}

pub struct Resolvable {
    token: Token,
    deps: Vec<Token>,
    resolve_fn: Option<ResolveFn>,
    policy: ResolvePolicy,
    resolution: Mutex<Resolution>,
}

impl Resolvable {
    pub fn new<F>(token: impl Into<Token>, deps: &[&str], resolve_fn: F) -> Self
    where
        F: Fn(Vec<Resolved>) -> anyhow::Result<ResolveOutput> + Send + Sync + 'static,
    {
        Self {
            token: token.into(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            resolve_fn: Some(Arc::new(resolve_fn)),
            policy: ResolvePolicy::default(),
            resolution: Mutex::new(Resolution::default()),
        }
    }

    /// An already-resolved value.
    pub fn from_value(token: impl Into<Token>, value: Resolved) -> Self {
        Self {
            token: token.into(),
            deps: Vec::new(),
            resolve_fn: None,
            policy: ResolvePolicy::default(),
            resolution: Mutex::new(Resolution {
                data: Some(value),
                in_flight: None,
            }),
        }
    }

    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn deps(&self) -> &[Token] {
        &self.deps
    }

    /// The policy declared on this Resolvable alone.
    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.lock().data.is_some()
    }

    /// The cached value, if resolved.
    pub fn data(&self) -> Option<Resolved> {
        self.resolution.lock().data.clone()
    }

    /// A copy that keeps the declaration and drops any computed result.
    ///
    /// Pre-resolved values (no resolver) keep their value.
    pub fn clone_fresh(&self) -> Self {
        let data = match self.resolve_fn {
            Some(_) => None,
            None => self.data(),
        };
        Self {
            token: self.token.clone(),
            deps: self.deps.clone(),
            resolve_fn: self.resolve_fn.clone(),
            policy: self.policy,
            resolution: Mutex::new(Resolution {
                data,
                in_flight: None,
            }),
        }
    }

    /// The value of this Resolvable, computing it at most once.
    ///
    /// Dependencies are looked up in `ctx` relative to the node holding `self`.
    pub fn get(self: &Arc<Self>, ctx: &ResolveContext) -> ResolveFuture {
        let mut resolution = self.resolution.lock();
        if let Some(data) = &resolution.data {
            return futures_util::future::ready(Ok(data.clone())).boxed();
        }
        if let Some(in_flight) = &resolution.in_flight {
            return in_flight.clone().boxed();
        }
        let in_flight = Arc::clone(self).resolve(ctx.clone()).boxed().shared();
        resolution.in_flight = Some(in_flight.clone());
        in_flight.boxed()
    }

    async fn resolve(self: Arc<Self>, ctx: ResolveContext) -> Result<Resolved, Rejection> {
        let deps = ctx.get_dependencies(&self)?;
        let values = try_join_all(deps.iter().map(|dep| dep.get(&ctx))).await?;

        let resolve_fn = self.resolve_fn.clone().ok_or_else(|| {
            Rejection::errored(RejectionDetail::Message(format!(
                "Resolvable '{}' has no resolver",
                self.token
            )))
        })?;
        let output = resolve_fn(values).map_err(Rejection::normalize)?;

        let async_policy = ctx.policy_for(&self).async_policy();
        let value = match output {
            ResolveOutput::Ready(value) => value,
            ResolveOutput::Deferred(future) => future.await.map_err(Rejection::normalize)?,
            ResolveOutput::Stream(mut stream) => {
                if async_policy != PolicyAsync::RxWait {
                    return Err(Rejection::errored(RejectionDetail::Message(format!(
                        "Resolvable '{}' returned a stream but its policy is not RXWAIT",
                        self.token
                    ))));
                }
                stream.next().await.ok_or_else(|| {
                    Rejection::errored(RejectionDetail::Message(format!(
                        "Stream for '{}' completed without emitting",
                        self.token
                    )))
                })?
            }
        };

        {
            let mut resolution = self.resolution.lock();
            resolution.data = Some(value.clone());
        }
        ctx.trace_event(TraceEvent::Resolved {
            transition_id: ctx.transition_id(),
            token: self.token.clone(),
        });
        Ok(value)
    }
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvable")
            .field("token", &self.token)
            .field("deps", &self.deps)
            .field("policy", &self.policy)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// The host dependency container, consulted for tokens not found on the path.
pub trait Injector: Send + Sync {
    fn get(&self, token: &str) -> Option<Resolved>;
}

/// A plain token-to-value [`Injector`].
#[derive(Default)]
pub struct HostContainer {
    values: HashMap<Token, Resolved>,
}

impl HostContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value for the same token.
    pub fn insert<T: Send + Sync + 'static>(&mut self, token: impl Into<Token>, value: T) {
        self.values.insert(token.into(), Arc::new(value));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, token: impl Into<Token>, value: T) -> Self {
        self.insert(token, value);
        self
    }

    pub fn contains(&self, token: &str) -> bool {
        self.values.contains_key(token)
    }
}

impl Injector for HostContainer {
    fn get(&self, token: &str) -> Option<Resolved> {
        self.values.get(token).cloned()
    }
}

impl fmt::Debug for HostContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContainer")
            .field("tokens", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Downcast a resolved value.
pub fn downcast<T: Send + Sync + 'static>(value: &Resolved) -> Option<&T> {
    value.downcast_ref::<T>()
}
