//! Proxy wrapper layer.
//!
//! A `Proxy` stands for one remote object. Every call goes through the same
//! pipeline:
//!
//! 1. check that the wrapper declares the operation
//! 2. bind (lazily starting the engine for root-level proxies)
//! 3. translate the operation name with `naming::to_remote_identifier`
//! 4. marshal arguments: enums become remote enum instances, proxies become
//!    their handles
//! 5. invoke on the shared channel
//! 6. unwrap the result, wrapping returned objects through the registry
//!
//! Typed wrappers are declared with `remote_wrapper!` and contain no call
//! logic of their own.

use crate::enums::EnumCatalog;
use crate::error::{MappingKind, PlanitError, Result};
use crate::gateway::Channel;
use crate::naming::to_remote_identifier;
use crate::process::EngineSupervisor;
use crate::registry::{self, ProxySpec};
use crate::value::{Arg, RemoteHandle, WireValue};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<(WireValue, Arc<Channel>)>> + Send + 'a>>;

/// Lifecycle of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// No handle resolved yet.
    Unbound,
    /// Holds a handle on a live channel.
    Bound,
    /// The engine state behind the handle is gone. Terminal.
    Invalid,
}

/// How a lazy proxy obtains its handle.
#[derive(Debug, Clone)]
pub enum Resolver {
    /// The engine root object, starting the engine if needed.
    Root(Arc<EngineSupervisor>),
    /// The result of calling `getter` on a parent proxy.
    Parent {
        parent: Proxy,
        getter: &'static str,
        args: Vec<Arg>,
    },
}

#[derive(Debug)]
enum Binding {
    Bound {
        handle: RemoteHandle,
        channel: Arc<Channel>,
    },
    Lazy {
        resolver: Resolver,
        cell: OnceCell<(RemoteHandle, Arc<Channel>)>,
    },
}

#[derive(Debug)]
struct ProxyInner {
    spec: &'static ProxySpec,
    binding: Binding,
}

/// Local stand-in for a remote object.
///
/// Cloning is cheap and clones share the binding.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("Proxy");
        out.field("type", &self.inner.spec.local_name);
        if let Some(handle) = self.handle() {
            out.field("id", &handle.id);
        }
        out.field("state", &self.state()).finish()
    }
}

impl Proxy {
    /// Proxy around a handle the engine already returned.
    pub fn bound(spec: &'static ProxySpec, handle: RemoteHandle, channel: Arc<Channel>) -> Self {
        Self::with_binding(spec, Binding::Bound { handle, channel })
    }

    /// Proxy for the engine root object; binds on first use.
    pub fn lazy_root(spec: &'static ProxySpec, supervisor: Arc<EngineSupervisor>) -> Self {
        Self::lazy(spec, Resolver::Root(supervisor))
    }

    /// Proxy for the object returned by `parent.getter(args)`; binds on first use.
    pub fn lazy_child(
        spec: &'static ProxySpec,
        parent: &Proxy,
        getter: &'static str,
        args: Vec<Arg>,
    ) -> Self {
        Self::lazy(
            spec,
            Resolver::Parent {
                parent: parent.clone(),
                getter,
                args,
            },
        )
    }

    fn lazy(spec: &'static ProxySpec, resolver: Resolver) -> Self {
        Self::with_binding(
            spec,
            Binding::Lazy {
                resolver,
                cell: OnceCell::new(),
            },
        )
    }

    fn with_binding(spec: &'static ProxySpec, binding: Binding) -> Self {
        Self {
            inner: Arc::new(ProxyInner { spec, binding }),
        }
    }

    pub fn spec(&self) -> &'static ProxySpec {
        self.inner.spec
    }

    /// Declared remote type name.
    pub fn remote_type(&self) -> &'static str {
        self.inner.spec.remote_type
    }

    /// Handle, if bound.
    pub fn handle(&self) -> Option<&RemoteHandle> {
        self.binding().map(|(handle, _)| handle)
    }

    pub fn state(&self) -> ProxyState {
        match self.binding() {
            None => ProxyState::Unbound,
            Some((_, channel)) if channel.is_closed() => ProxyState::Invalid,
            Some(_) => ProxyState::Bound,
        }
    }

    fn binding(&self) -> Option<(&RemoteHandle, &Arc<Channel>)> {
        match &self.inner.binding {
            Binding::Bound { handle, channel } => Some((handle, channel)),
            Binding::Lazy { cell, .. } => cell.get().map(|(handle, channel)| (handle, channel)),
        }
    }

    /// Resolve the handle and channel, binding a lazy proxy on first use.
    ///
    /// An invalid proxy fails with a channel error; it never rebinds.
    pub async fn bind(&self) -> Result<(RemoteHandle, Arc<Channel>)> {
        self.bind_for(self.remote_type()).await
    }

    /// Like `bind`, naming `operation` in a channel error.
    async fn bind_for(&self, operation: &str) -> Result<(RemoteHandle, Arc<Channel>)> {
        let (handle, channel) = match &self.inner.binding {
            Binding::Bound { handle, channel } => (handle.clone(), channel.clone()),
            Binding::Lazy { resolver, cell } => {
                let (handle, channel) = cell
                    .get_or_try_init(|| self.resolve(resolver))
                    .await?;
                (handle.clone(), channel.clone())
            }
        };

        if channel.is_closed() {
            return Err(PlanitError::channel_lost(
                operation,
                "proxy belongs to an engine state that has been torn down",
            ));
        }
        Ok((handle, channel))
    }

    async fn resolve(&self, resolver: &Resolver) -> Result<(RemoteHandle, Arc<Channel>)> {
        let (handle, channel) = match resolver {
            Resolver::Root(supervisor) => {
                let session = supervisor.ensure_started().await?;
                (session.root, session.channel)
            }
            Resolver::Parent {
                parent,
                getter,
                args,
            } => {
                let (value, channel) = parent.call_on_channel(getter, args.clone()).await?;
                match value {
                    WireValue::Object(handle) => (handle, channel),
                    other => {
                        return Err(PlanitError::mapping(
                            MappingKind::ReturnValue,
                            format!(
                                "{}.{} returned {}, expected {}",
                                parent.spec().local_name,
                                getter,
                                other.type_label(),
                                self.remote_type()
                            ),
                        ))
                    }
                }
            }
        };

        if handle.type_name != self.remote_type() {
            return Err(PlanitError::mapping(
                MappingKind::RemoteType,
                format!(
                    "{} (expected {} for {})",
                    handle.type_name,
                    self.remote_type(),
                    self.spec().local_name
                ),
            ));
        }
        debug!("Bound {} to {}", self.spec().local_name, handle);
        Ok((handle, channel))
    }

    /// Forward a declared operation and return the raw result.
    pub async fn call(&self, operation: &str, args: Vec<Arg>) -> Result<WireValue> {
        Ok(self.call_on_channel(operation, args).await?.0)
    }

    /// Forward a declared operation and convert the result.
    pub async fn call_as<R: FromReturned>(&self, operation: &str, args: Vec<Arg>) -> Result<R> {
        let (value, channel) = self.call_on_channel(operation, args).await?;
        let qualified = format!("{}.{}", self.spec().local_name, operation);
        let context = ReturnContext {
            channel: &channel,
            operation: &qualified,
        };
        R::from_returned(value, &context)
    }

    // Boxed: binding a lazy child calls back into its parent.
    fn call_on_channel<'a>(&'a self, operation: &'a str, args: Vec<Arg>) -> CallFuture<'a> {
        Box::pin(async move {
            let spec = self.spec();
            if !spec.declares(operation) {
                return Err(PlanitError::mapping(
                    MappingKind::Operation,
                    format!("{}.{}", spec.local_name, operation),
                ));
            }

            let method = to_remote_identifier(operation);
            let target = format!("{}.{}", self.remote_type(), method);
            let (handle, channel) = self.bind_for(&target).await?;
            let wire_args = marshal_args(&channel, &target, args).await?;
            let value = channel.invoke(&handle, &method, wire_args).await?;
            Ok((value, channel))
        })
    }

    /// Convert into a typed wrapper, checking the declared remote type.
    pub fn downcast<T: RemoteObject>(self) -> Result<T> {
        if self.remote_type() != T::spec().remote_type {
            return Err(PlanitError::mapping(
                MappingKind::RemoteType,
                format!(
                    "{} is not a {}",
                    self.remote_type(),
                    T::spec().local_name
                ),
            ));
        }
        Ok(T::from_proxy_unchecked(self))
    }

    /// True if both proxies are bound to the same remote object.
    pub fn same_object(&self, other: &Proxy) -> bool {
        match (self.handle(), other.handle()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Reduce arguments to wire values.
///
/// Enums are created remotely first, one `createEnum` per enum argument, in
/// argument order. Failures name `target`, the qualified remote method.
async fn marshal_args(channel: &Arc<Channel>, target: &str, args: Vec<Arg>) -> Result<Vec<WireValue>> {
    let mut wire = Vec::with_capacity(args.len());
    for arg in args {
        let value = match arg {
            Arg::Value(value) => value,
            Arg::Enum(enum_ref) => {
                if EnumCatalog::ensure_registered(&enum_ref).is_err() {
                    return Err(PlanitError::mapping(
                        MappingKind::EnumValue,
                        format!("{} (argument of {})", enum_ref, target),
                    ));
                }
                WireValue::Object(
                    channel
                        .create_enum(enum_ref.remote_class, enum_ref.constant)
                        .await?,
                )
            }
            Arg::Object(proxy) => {
                let (handle, owner) = proxy.bind_for(target).await?;
                if !Arc::ptr_eq(&owner, channel) {
                    return Err(PlanitError::channel_lost(
                        target,
                        format!(
                            "argument {} belongs to a different engine state",
                            proxy.spec().local_name
                        ),
                    ));
                }
                WireValue::Object(handle)
            }
        };
        wire.push(value);
    }
    Ok(wire)
}

/// What a result conversion may need: the channel for new proxies and the
/// operation name for error messages.
pub struct ReturnContext<'a> {
    pub channel: &'a Arc<Channel>,
    pub operation: &'a str,
}

impl ReturnContext<'_> {
    fn unexpected(&self, value: &WireValue, expected: &str) -> PlanitError {
        PlanitError::mapping(
            MappingKind::ReturnValue,
            format!(
                "{} returned {}, expected {}",
                self.operation,
                value.type_label(),
                expected
            ),
        )
    }
}

/// Conversion from a returned wire value to a local type.
pub trait FromReturned: Sized {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self>;
}

impl FromReturned for () {
    fn from_returned(_value: WireValue, _context: &ReturnContext<'_>) -> Result<Self> {
        Ok(())
    }
}

impl FromReturned for WireValue {
    fn from_returned(value: WireValue, _context: &ReturnContext<'_>) -> Result<Self> {
        Ok(value)
    }
}

impl FromReturned for bool {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| context.unexpected(&value, "bool"))
    }
}

impl FromReturned for i64 {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| context.unexpected(&value, "int"))
    }
}

impl FromReturned for f64 {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| context.unexpected(&value, "float"))
    }
}

impl FromReturned for String {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        match value {
            WireValue::String(s) => Ok(s),
            other => Err(context.unexpected(&other, "string")),
        }
    }
}

impl FromReturned for Vec<WireValue> {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        match value {
            WireValue::List(items) => Ok(items),
            other => Err(context.unexpected(&other, "list")),
        }
    }
}

impl<T: FromReturned> FromReturned for Option<T> {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_returned(value, context).map(Some)
        }
    }
}

/// Returned objects are wrapped through the registry; unknown types fail.
impl FromReturned for Proxy {
    fn from_returned(value: WireValue, context: &ReturnContext<'_>) -> Result<Self> {
        match value {
            WireValue::Object(handle) => registry::wrap(handle, context.channel.clone()),
            other => Err(context.unexpected(&other, "object")),
        }
    }
}

/// A typed wrapper over a `Proxy`.
pub trait RemoteObject: Sized + Clone {
    fn spec() -> &'static ProxySpec;

    /// Wrap without checking the remote type.
    fn from_proxy_unchecked(proxy: Proxy) -> Self;

    fn proxy(&self) -> &Proxy;

    /// Wrapper for the engine root object.
    fn lazy_root(supervisor: Arc<EngineSupervisor>) -> Self {
        Self::from_proxy_unchecked(Proxy::lazy_root(Self::spec(), supervisor))
    }

    /// Wrapper for `parent.getter(args)`, resolved on first use.
    fn lazy_child(parent: &Proxy, getter: &'static str, args: Vec<Arg>) -> Self {
        Self::from_proxy_unchecked(Proxy::lazy_child(Self::spec(), parent, getter, args))
    }

    fn state(&self) -> ProxyState {
        self.proxy().state()
    }
}

/// Declare a typed wrapper: remote type name and the operations it forwards.
///
/// ```ignore
/// remote_wrapper! {
///     pub struct StopCriterion = "org.planit.gap.StopCriterion" {
///         fn set_max_iterations(max_iterations: i64) -> ();
///         fn set_epsilon(epsilon: f64) -> ();
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_wrapper {
    (
        $(#[$meta:meta])*
        pub struct $name:ident = $remote:literal {
            $(
                $(#[$fmeta:meta])*
                fn $op:ident ( $( $arg:ident : $argty:ty ),* $(,)? ) -> $ret:ty ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            proxy: $crate::proxy::Proxy,
        }

        impl $name {
            pub const SPEC: $crate::registry::ProxySpec = $crate::registry::ProxySpec {
                remote_type: $remote,
                local_name: stringify!($name),
                operations: &[$( stringify!($op) ),*],
            };

            $(
                $(#[$fmeta])*
                pub async fn $op(&self $(, $arg: $argty)*) -> $crate::Result<$ret> {
                    self.proxy
                        .call_as::<$ret>(
                            stringify!($op),
                            vec![$( $crate::value::Arg::from($arg) ),*],
                        )
                        .await
                }
            )*
        }

        impl $crate::proxy::RemoteObject for $name {
            fn spec() -> &'static $crate::registry::ProxySpec {
                &Self::SPEC
            }

            fn from_proxy_unchecked(proxy: $crate::proxy::Proxy) -> Self {
                Self { proxy }
            }

            fn proxy(&self) -> &$crate::proxy::Proxy {
                &self.proxy
            }
        }

        impl $crate::proxy::FromReturned for $name {
            fn from_returned(
                value: $crate::value::WireValue,
                context: &$crate::proxy::ReturnContext<'_>,
            ) -> $crate::Result<Self> {
                <$crate::proxy::Proxy as $crate::proxy::FromReturned>::from_returned(value, context)?
                    .downcast::<$name>()
            }
        }

        impl From<&$name> for $crate::value::Arg {
            fn from(value: &$name) -> Self {
                $crate::value::Arg::Object(value.proxy.clone())
            }
        }

        impl From<$name> for $crate::value::Arg {
            fn from(value: $name) -> Self {
                $crate::value::Arg::Object(value.proxy)
            }
        }
    };
}
