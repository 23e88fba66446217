//! The nested scope stack
//!
//! Two tiers of frames are active during an execution:
//!
//! - **Global** frames live in a list shared by every execution on the same
//!   engine instance, behind a read-mostly lock.
//! - **Local** frames are context-passed: entering one returns a *new*
//!   [`ScopeStack`] whose frame list includes the new frame. Only the call
//!   tree that was handed the new stack sees the frame; sibling executions
//!   keep their own stacks. This replaces ambient thread/coroutine-local
//!   storage with explicit ownership.
//!
//! Exiting runs the frame's teardowns LIFO with failures aggregated, evicts
//! its cache, and removes its scoped bind entries. [`ScopeGuard::exit`] is
//! the supported path; dropping a guard without exiting is a backstop that
//! cannot await async teardowns.

use std::sync::{Arc, RwLock};

use tracing::{debug, error};
use weft_core::{Error, Result, Scope, ScopeKind};

use crate::bind::{BindHandle, BindRegistry, Matcher};
use weft_core::Dependent;

use super::frame::ScopeFrame;

/// Engine-wide list of active global frames, outermost first.
pub(crate) struct GlobalScopes {
    frames: RwLock<Vec<Arc<ScopeFrame>>>,
}

impl GlobalScopes {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(GlobalScopes {
            frames: RwLock::new(Vec::new()),
        })
    }

    pub(crate) fn push(&self, frame: Arc<ScopeFrame>) -> Result<()> {
        let mut frames = self.frames.write().expect("global scopes poisoned");
        if frames.iter().any(|f| f.label() == frame.label()) {
            return Err(Error::DuplicateScope {
                scope: frame.label().clone(),
            });
        }
        frames.push(frame);
        Ok(())
    }

    pub(crate) fn remove(&self, frame: &Arc<ScopeFrame>) {
        self.frames
            .write()
            .expect("global scopes poisoned")
            .retain(|f| !Arc::ptr_eq(f, frame));
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ScopeFrame>> {
        self.frames.read().expect("global scopes poisoned").clone()
    }
}

/// The active frames visible to one execution context.
#[derive(Clone)]
pub struct ScopeStack {
    global: Arc<GlobalScopes>,
    registry: Arc<BindRegistry>,
    local: Vec<Arc<ScopeFrame>>,
}

impl ScopeStack {
    pub(crate) fn new(global: Arc<GlobalScopes>, registry: Arc<BindRegistry>) -> Self {
        ScopeStack {
            global,
            registry,
            local: Vec::new(),
        }
    }

    /// Enter a local frame. Returns the extended stack to thread through the
    /// scope body, plus the guard that exits the frame.
    pub fn enter_local(&self, scope: impl Into<Scope>) -> Result<(ScopeStack, ScopeGuard)> {
        let scope = scope.into();
        if self.find(&scope).is_some() {
            return Err(Error::DuplicateScope { scope });
        }
        debug!(scope = %scope, kind = ?ScopeKind::Local, "entering scope");
        let frame = ScopeFrame::new(scope, ScopeKind::Local);
        let mut extended = self.clone();
        extended.local.push(Arc::clone(&frame));
        let guard = ScopeGuard {
            frame,
            registry: Arc::clone(&self.registry),
            global: None,
            exited: false,
        };
        Ok((extended, guard))
    }

    /// Enter a local scope around an async body, with guaranteed exit on
    /// every path.
    ///
    /// A body error takes precedence over teardown failures, which are then
    /// only logged; with a successful body, teardown failures surface as
    /// [`Error::Teardown`].
    pub async fn with_local<T, F, Fut>(&self, scope: impl Into<Scope>, f: F) -> Result<T>
    where
        F: FnOnce(ScopeStack) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (stack, guard) = self.enter_local(scope)?;
        let outcome = f(stack).await;
        let teardown = guard.exit().await;
        match outcome {
            Ok(value) => {
                teardown?;
                Ok(value)
            }
            Err(err) => {
                if let Err(td) = teardown {
                    error!(error = %td, "teardown failed while unwinding a failed scope body");
                }
                Err(err)
            }
        }
    }

    /// The innermost active frame for `scope`, walking local frames first,
    /// then global frames, both innermost to outermost.
    pub(crate) fn find(&self, scope: &Scope) -> Option<Arc<ScopeFrame>> {
        self.local
            .iter()
            .rev()
            .find(|frame| frame.label() == scope && !frame.is_closed())
            .cloned()
            .or_else(|| {
                self.global
                    .snapshot()
                    .into_iter()
                    .rev()
                    .find(|frame| frame.label() == scope && !frame.is_closed())
            })
    }

    /// The innermost active frame of any label.
    fn innermost(&self) -> Option<Arc<ScopeFrame>> {
        self.local
            .iter()
            .rev()
            .find(|frame| !frame.is_closed())
            .cloned()
            .or_else(|| {
                self.global
                    .snapshot()
                    .into_iter()
                    .rev()
                    .find(|frame| !frame.is_closed())
            })
    }

    /// Labels of every active frame, outermost first.
    pub fn active_scopes(&self) -> Vec<Scope> {
        self.global
            .snapshot()
            .iter()
            .chain(self.local.iter())
            .filter(|frame| !frame.is_closed())
            .map(|frame| frame.label().clone())
            .collect()
    }

    /// Register a bind scoped to a frame: the entry is removed automatically
    /// when that frame exits. With `scope = None` the innermost active frame
    /// owns the entry.
    pub fn bind_scoped(
        &self,
        matcher: Matcher,
        substitute: Arc<Dependent>,
        scope: Option<Scope>,
    ) -> Result<BindHandle> {
        let frame = match &scope {
            Some(label) => self.find(label).ok_or_else(|| Error::ScopeNotActive {
                scope: label.clone(),
                key: substitute.key().clone(),
            })?,
            None => self
                .innermost()
                .ok_or_else(|| Error::ScopeNotActive {
                    scope: Scope::new("<any>"),
                    key: substitute.key().clone(),
                })?,
        };
        let handle = self.registry.bind(matcher, substitute);
        frame.attach_bind(handle);
        Ok(handle)
    }
}

impl std::fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeStack")
            .field("active", &self.active_scopes())
            .finish()
    }
}

/// Scoped-acquisition handle for an entered frame.
///
/// Call [`ScopeGuard::exit`] to leave the scope and run its teardowns. If
/// the guard is dropped without exiting, sync teardowns still run and any
/// async teardowns are skipped with an error log — Rust cannot await inside
/// `Drop`.
pub struct ScopeGuard {
    frame: Arc<ScopeFrame>,
    registry: Arc<BindRegistry>,
    global: Option<Arc<GlobalScopes>>,
    exited: bool,
}

impl ScopeGuard {
    pub(crate) fn global(
        frame: Arc<ScopeFrame>,
        registry: Arc<BindRegistry>,
        scopes: Arc<GlobalScopes>,
    ) -> Self {
        ScopeGuard {
            frame,
            registry,
            global: Some(scopes),
            exited: false,
        }
    }

    /// The label of the guarded frame.
    pub fn scope(&self) -> &Scope {
        self.frame.label()
    }

    /// Exit the frame: teardowns run LIFO with failures aggregated, the
    /// cache is evicted, and scoped binds are removed.
    pub async fn exit(mut self) -> std::result::Result<(), weft_core::TeardownError> {
        self.exited = true;
        if let Some(global) = &self.global {
            global.remove(&self.frame);
        }
        self.frame.close(&self.registry).await
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Some(global) = &self.global {
            global.remove(&self.frame);
        }
        let skipped = self.frame.close_sync(&self.registry);
        if skipped > 0 {
            error!(
                scope = %self.frame.label(),
                skipped,
                "scope guard dropped without exit(); async teardowns were skipped"
            );
        }
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("scope", self.frame.label())
            .field("exited", &self.exited)
            .finish()
    }
}
