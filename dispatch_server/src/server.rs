use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{HttpServiceFactory, Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
    Scope,
};
use dispatch_common::Secret;
use dispatch_engine::{
    api::messenger::Messenger,
    events::EventHandlers,
    ActivityApi,
    DeliveryApi,
    IdempotencyBackend,
    IdempotencyCache,
    InvoiceService,
    LedgerStore,
    MemoryIdempotencyCache,
    Notifier,
    PaymentFlowApi,
    PaymentGateway,
    ReconciliationApi,
    SqliteDatabase,
    SqliteIdempotencyCache,
};
use dispatch_gateways::{InvoiceRendererClient, PaystackClient, WhatsAppClient};
use futures::{future::ok, FutureExt};
use log::*;

use crate::{
    alerts::{alert_queue, create_event_hooks, run_alert_batcher},
    config::{IdempotencyBackendKind, ServerConfig},
    connections::ConnectionRegistry,
    errors::ServerError,
    helpers::is_whitelisted,
    middleware::AdminKeyMiddlewareFactory,
    routes::{
        alert_stream,
        delivery_stream,
        health,
        CancelDeliveryRoute,
        ConfirmDeliveryRoute,
        DeliveryStatusRoute,
        OrderReportRoute,
        PaystackWebhookRoute,
        ReassignDeliveryRoute,
        RecentActivityRoute,
        ReleaseEscrowRoute,
        RiderLocationRoute,
        RiderStatusRoute,
    },
    sweep_worker::{start_idempotency_purge_worker, start_sweep_workers},
};

const EVENT_BUFFER_SIZE: usize = 50;
const MAX_DB_CONNECTIONS: u32 = 25;

pub type PaymentsApi =
    PaymentFlowApi<SqliteDatabase, IdempotencyBackend, PaystackClient, WhatsAppClient, InvoiceRendererClient>;
pub type DeliveriesApi = DeliveryApi<SqliteDatabase, PaystackClient, WhatsAppClient>;

/// Everything the request handlers need. Cloned into every worker.
#[derive(Clone)]
pub struct ServerApis {
    pub payments: PaymentsApi,
    pub deliveries: DeliveriesApi,
    pub activity: ActivityApi<SqliteDatabase>,
    pub registry: ConnectionRegistry,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not migrate the database. {e}")))?;
    info!("💻️ Database at {} is ready", config.database_url);
    let gateway = PaystackClient::new(config.paystack.clone()).map_err(|e| init_error("Paystack", e))?;
    let notifier = WhatsAppClient::new(config.whatsapp.clone()).map_err(|e| init_error("WhatsApp", e))?;
    let invoices = InvoiceRendererClient::new(config.invoices.clone()).map_err(|e| init_error("invoice", e))?;
    let cache = match config.idempotency_backend {
        IdempotencyBackendKind::Sqlite => IdempotencyBackend::Sqlite(SqliteIdempotencyCache::new(db.clone())),
        IdempotencyBackendKind::Memory => {
            warn!("💻️ Webhook idempotency keys are kept in memory. Do not run more than one instance like this.");
            IdempotencyBackend::Memory(MemoryIdempotencyCache::new())
        },
    };

    let registry = ConnectionRegistry::new();
    let alert_batch = if config.admin_alert_recipients.is_empty() {
        None
    } else {
        let (sender, queue) = alert_queue();
        let messenger = Messenger::new(notifier.clone(), config.broadcast_delay);
        let recipients = config.admin_alert_recipients.clone();
        tokio::spawn(run_alert_batcher(queue, messenger, recipients, config.alert_batch_window));
        Some(sender)
    };
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, create_event_hooks(registry.clone(), alert_batch));
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let engine_config = config.engine_config();
    let payments = PaymentFlowApi::new(
        db.clone(),
        cache.clone(),
        gateway.clone(),
        notifier.clone(),
        invoices,
        producers.clone(),
        engine_config.clone(),
        config.paystack.secret_key.clone(),
    );
    if config.sweeps_enabled {
        let sweeps = ReconciliationApi::new(db.clone(), gateway, notifier, producers.clone(), engine_config);
        start_sweep_workers(sweeps, config.instance_id.clone());
        start_idempotency_purge_worker(cache);
    }
    let apis = ServerApis {
        deliveries: payments.deliveries().clone(),
        activity: ActivityApi::new(db, producers),
        payments,
        registry,
    };
    let srv = create_server_instance(config, apis)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

fn init_error<E: std::fmt::Display>(client: &str, e: E) -> ServerError {
    ServerError::InitializeError(format!("Could not create the {client} client. {e}"))
}

pub fn create_server_instance(config: ServerConfig, apis: ServerApis) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("dsp::access_log"))
            .app_data(web::Data::new(apis.payments.clone()))
            .app_data(web::Data::new(apis.deliveries.clone()))
            .app_data(web::Data::new(apis.activity.clone()))
            .app_data(web::Data::new(apis.registry.clone()));
        let webhook_scope =
            webhook_scope::<SqliteDatabase, IdempotencyBackend, PaystackClient, WhatsAppClient, InvoiceRendererClient>(
                config.paystack_whitelist.clone(),
                config.use_x_forwarded_for,
                config.use_forwarded,
            );
        // The admin scope must be registered before `/api`, which would otherwise swallow its paths
        app.service(health)
            .service(webhook_scope)
            .service(admin_scope::<SqliteDatabase, PaystackClient, WhatsAppClient>(config.admin_api_key.clone()))
            .service(api_scope::<SqliteDatabase, PaystackClient, WhatsAppClient>())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Dispatch server listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// The payment gateway webhook. If a whitelist is given, calls from any other address are refused with a 403.
pub fn webhook_scope<B, C, G, N, I>(
    whitelist: Option<Vec<IpAddr>>,
    use_x_forwarded_for: bool,
    use_forwarded: bool,
) -> impl HttpServiceFactory
where
    B: LedgerStore + 'static,
    C: IdempotencyCache + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
    I: InvoiceService + 'static,
{
    web::scope("/webhook")
        .wrap_fn(move |req, srv| {
            // Collect peer IP from x-forwarded-for, or forwarded headers _if_ `use_nnn` has been set to true
            // in the configuration. Otherwise, use the peer address from the connection info.
            if is_whitelisted(&req, whitelist.as_deref(), use_x_forwarded_for, use_forwarded) {
                srv.call(req)
            } else {
                let err = ServerError::Forbidden("The caller is not on the webhook whitelist".into());
                ok(req.error_response(err)).boxed_local()
            }
        })
        .service(PaystackWebhookRoute::<B, C, G, N, I>::new())
}

/// Rider and customer actions
pub fn api_scope<B, G, N>() -> Scope
where
    B: LedgerStore + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    web::scope("/api")
        .service(RiderStatusRoute::<B, G, N>::new())
        .service(RiderLocationRoute::<B, G, N>::new())
        .service(DeliveryStatusRoute::<B, G, N>::new())
        .service(ConfirmDeliveryRoute::<B, G, N>::new())
}

/// Admin actions. Every route requires the admin key.
pub fn admin_scope<B, G, N>(admin_key: Secret<String>) -> impl HttpServiceFactory
where
    B: LedgerStore + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    web::scope("/api/admin")
        .wrap(AdminKeyMiddlewareFactory::new(admin_key))
        .service(alert_stream)
        .service(delivery_stream)
        .service(ReassignDeliveryRoute::<B, G, N>::new())
        .service(CancelDeliveryRoute::<B, G, N>::new())
        .service(ReleaseEscrowRoute::<B, G, N>::new())
        .service(OrderReportRoute::<B, G, N>::new())
        .service(RecentActivityRoute::<B>::new())
}
