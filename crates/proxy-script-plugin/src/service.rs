//! Host-facing method surface.
//!
//! The host calls one method per hook. Every method has the same shape,
//! `(ExecutionContext, Record) -> HookReply`, and by default forwards to
//! [`HookService::dispatch`] with its own fixed [`HookName`]. Counting and
//! passthrough happen in the invoker, so a method body never does more than
//! name its hook.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::PluginError;
use crate::handler::HookReply;
use crate::hooks::HookName;
use crate::value::Record;

/// The plugin as seen by the host process.
#[async_trait]
pub trait HookService: Send + Sync {
    /// Run the script function bound to `hook`.
    async fn dispatch(&self, hook: HookName, ctx: ExecutionContext, req: Record) -> HookReply;

    /// Configuration handshake: plugin identity, settings and capabilities.
    async fn get_plugin_config(&self, ctx: ExecutionContext) -> Result<Record, PluginError>;

    /// Route a call by the host's numeric hook identifier.
    ///
    /// Unknown identifiers pass the request through with
    /// [`PluginError::UnknownHook`].
    async fn route(&self, id: i32, ctx: ExecutionContext, req: Record) -> HookReply {
        let Some(hook) = HookName::from_id(id) else {
            tracing::warn!(id, "host called an unknown hook id");
            return HookReply::failed(req, PluginError::UnknownHook(id.to_string()));
        };
        match hook {
            HookName::OnConfigLoaded => self.on_config_loaded(ctx, req).await,
            HookName::OnNewLogger => self.on_new_logger(ctx, req).await,
            HookName::OnNewPool => self.on_new_pool(ctx, req).await,
            HookName::OnNewClient => self.on_new_client(ctx, req).await,
            HookName::OnNewProxy => self.on_new_proxy(ctx, req).await,
            HookName::OnNewServer => self.on_new_server(ctx, req).await,
            HookName::OnSignal => self.on_signal(ctx, req).await,
            HookName::OnRun => self.on_run(ctx, req).await,
            HookName::OnBooting => self.on_booting(ctx, req).await,
            HookName::OnBooted => self.on_booted(ctx, req).await,
            HookName::OnOpening => self.on_opening(ctx, req).await,
            HookName::OnOpened => self.on_opened(ctx, req).await,
            HookName::OnClosing => self.on_closing(ctx, req).await,
            HookName::OnClosed => self.on_closed(ctx, req).await,
            HookName::OnTraffic => self.on_traffic(ctx, req).await,
            HookName::OnTrafficFromClient => self.on_traffic_from_client(ctx, req).await,
            HookName::OnTrafficToServer => self.on_traffic_to_server(ctx, req).await,
            HookName::OnTrafficFromServer => self.on_traffic_from_server(ctx, req).await,
            HookName::OnTrafficToClient => self.on_traffic_to_client(ctx, req).await,
            HookName::OnShutdown => self.on_shutdown(ctx, req).await,
            HookName::OnTick => self.on_tick(ctx, req).await,
        }
    }

    // -- Configuration and startup --

    async fn on_config_loaded(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnConfigLoaded, ctx, req).await
    }

    /// Notification.
    async fn on_new_logger(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnNewLogger, ctx, req).await
    }

    /// Notification.
    async fn on_new_pool(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnNewPool, ctx, req).await
    }

    /// Notification.
    async fn on_new_client(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnNewClient, ctx, req).await
    }

    /// Notification.
    async fn on_new_proxy(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnNewProxy, ctx, req).await
    }

    /// Notification.
    async fn on_new_server(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnNewServer, ctx, req).await
    }

    /// Notification.
    async fn on_signal(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnSignal, ctx, req).await
    }

    async fn on_run(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnRun, ctx, req).await
    }

    async fn on_booting(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnBooting, ctx, req).await
    }

    async fn on_booted(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnBooted, ctx, req).await
    }

    // -- Client connections --

    async fn on_opening(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnOpening, ctx, req).await
    }

    async fn on_opened(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnOpened, ctx, req).await
    }

    async fn on_closing(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnClosing, ctx, req).await
    }

    async fn on_closed(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnClosed, ctx, req).await
    }

    // -- Traffic --

    /// Notification. Errors are reported like any other hook.
    async fn on_traffic(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTraffic, ctx, req).await
    }

    async fn on_traffic_from_client(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTrafficFromClient, ctx, req).await
    }

    async fn on_traffic_to_server(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTrafficToServer, ctx, req).await
    }

    async fn on_traffic_from_server(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTrafficFromServer, ctx, req).await
    }

    async fn on_traffic_to_client(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTrafficToClient, ctx, req).await
    }

    // -- Shutdown and housekeeping --

    async fn on_shutdown(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnShutdown, ctx, req).await
    }

    async fn on_tick(&self, ctx: ExecutionContext, req: Record) -> HookReply {
        self.dispatch(HookName::OnTick, ctx, req).await
    }
}
