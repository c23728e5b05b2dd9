//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! The routes fall into three groups:
//! * The payment gateway webhook, `/webhook/paystack`. Authenticated by its HMAC signature (checked in the engine)
//!   and, optionally, by the caller's IP address.
//! * Rider and customer actions under `/api`.
//! * Admin actions under `/api/admin`, which require the `X-Admin-Key` header.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. I/O, database operations,
//! messaging) must be awaited, never blocked on.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use dispatch_engine::{
    ActivityApi,
    DeliveryApi,
    IdempotencyCache,
    InvoiceService,
    LedgerStore,
    Notifier,
    PaymentFlowApi,
    PaymentGateway,
};
use log::*;

use crate::{
    connections::{sse_stream, ConnectionRegistry, ALERTS_TOPIC, DELIVERIES_TOPIC},
    data_objects::{
        ActivityQuery,
        ConfirmationResult,
        DeliveryStatusParams,
        JsonResponse,
        LocationParams,
        OrderReport,
        ReasonParams,
        ReassignmentResult,
        RiderStatusParams,
        SettlementResult,
        StreamQuery,
        TransitionResult,
    },
    errors::ServerError,
};

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(paystack_webhook => Post "/paystack" impl LedgerStore, IdempotencyCache, PaymentGateway, Notifier, InvoiceService);
/// Route handler for the payment gateway webhook
///
/// The body is passed to the engine exactly as received, since the signature in the `x-paystack-signature` header is
/// an HMAC of the raw bytes.
///
/// Every event that was handled (including duplicates, unknown references and ignored event types) gets a 200, so
/// that the gateway stops retrying. A bad signature gets a 400, and a failure on our side gets a 5xx, which makes
/// the gateway deliver the event again later.
pub async fn paystack_webhook<B, C, G, N, I>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<B, C, G, N, I>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    C: IdempotencyCache,
    G: PaymentGateway,
    N: Notifier,
    I: InvoiceService,
{
    trace!("💻️ Received payment webhook call ({} bytes)", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = api.handle_webhook(&body, signature).await.map_err(|e| {
        warn!("💻️ Could not process payment webhook. {e}");
        ServerError::from(e)
    })?;
    info!("💻️ Payment webhook handled: {outcome}");
    Ok(HttpResponse::Ok().json(JsonResponse::success(outcome)))
}

//----------------------------------------------   Riders  ----------------------------------------------------
route!(rider_status => Post "/riders/{id}/status" impl LedgerStore, PaymentGateway, Notifier);
/// A rider goes online or offline. Going offline is refused while the rider is on a delivery.
pub async fn rider_status<B, G, N>(
    path: web::Path<i64>,
    body: web::Json<RiderStatusParams>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let rider_id = path.into_inner();
    let online = body.online;
    debug!("💻️ POST rider {rider_id} status. online: {online}");
    let rider = api.set_rider_online(rider_id, online).await?;
    Ok(HttpResponse::Ok().json(rider))
}

route!(rider_location => Post "/riders/{id}/location" impl LedgerStore, PaymentGateway, Notifier);
pub async fn rider_location<B, G, N>(
    path: web::Path<i64>,
    body: web::Json<LocationParams>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let rider_id = path.into_inner();
    let LocationParams { lat, lng } = body.into_inner();
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ServerError::InvalidRequestBody(format!("({lat}, {lng}) is not a valid location")));
    }
    trace!("💻️ POST rider {rider_id} location ({lat}, {lng})");
    let rider = api.update_rider_location(rider_id, lat, lng).await?;
    Ok(HttpResponse::Ok().json(rider))
}

//----------------------------------------------   Deliveries  ----------------------------------------------------
route!(delivery_status => Post "/deliveries/{id}/status" impl LedgerStore, PaymentGateway, Notifier);
/// The assigned rider reports progress: `PICKED_UP`, `IN_TRANSIT` or `DELIVERED`.
///
/// Any other status, a status that does not follow from the current one, or a rider who is not assigned to the
/// delivery, is refused and changes nothing.
pub async fn delivery_status<B, G, N>(
    path: web::Path<i64>,
    body: web::Json<DeliveryStatusParams>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let delivery_id = path.into_inner();
    let DeliveryStatusParams { rider_id, status, note } = body.into_inner();
    debug!("💻️ POST delivery {delivery_id} status {status} from rider {rider_id}");
    let transition = api.update_delivery_status(delivery_id, rider_id, status, note.as_deref()).await?;
    Ok(HttpResponse::Ok().json(TransitionResult::from(transition)))
}

route!(confirm_delivery => Post "/deliveries/{id}/confirm" impl LedgerStore, PaymentGateway, Notifier);
/// The customer confirms receipt, which releases the escrow. Confirming more than once is harmless.
pub async fn confirm_delivery<B, G, N>(
    path: web::Path<i64>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let delivery_id = path.into_inner();
    debug!("💻️ POST confirm delivery {delivery_id}");
    let settlement = api.confirm_delivery(delivery_id).await?.map(SettlementResult::from);
    Ok(HttpResponse::Ok().json(ConfirmationResult { delivery_id, settlement }))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(reassign_delivery => Post "/deliveries/{id}/reassign" impl LedgerStore, PaymentGateway, Notifier);
/// Moves a delivery to the nearest free rider. If nobody is free, the delivery stays where it is and
/// `reassigned` is false.
pub async fn reassign_delivery<B, G, N>(
    path: web::Path<i64>,
    body: Option<web::Json<ReasonParams>>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let delivery_id = path.into_inner();
    let reason = body.map(|b| b.into_inner()).unwrap_or_default().reason_or("admin request");
    info!("💻️ POST reassign delivery {delivery_id}. {reason}");
    let reassignment = api.reassign_delivery(delivery_id, &reason).await?;
    Ok(HttpResponse::Ok().json(ReassignmentResult::from(reassignment)))
}

route!(cancel_delivery => Post "/deliveries/{id}/cancel" impl LedgerStore, PaymentGateway, Notifier);
pub async fn cancel_delivery<B, G, N>(
    path: web::Path<i64>,
    body: Option<web::Json<ReasonParams>>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let delivery_id = path.into_inner();
    let reason = body.map(|b| b.into_inner()).unwrap_or_default().reason_or("cancelled by an administrator");
    info!("💻️ POST cancel delivery {delivery_id}. {reason}");
    let transition = api.cancel_delivery(delivery_id, &reason).await?;
    Ok(HttpResponse::Ok().json(TransitionResult::from(transition)))
}

route!(release_escrow => Post "/orders/{id}/release" impl LedgerStore, PaymentGateway, Notifier);
/// Releases an order's escrow by hand, e.g. after a dispute was settled in the merchant's favour.
pub async fn release_escrow<B, G, N>(
    path: web::Path<i64>,
    api: web::Data<DeliveryApi<B, G, N>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = path.into_inner();
    info!("💻️ POST release escrow for order {order_id}");
    let record = api.settlement().release_escrow(order_id).await?;
    Ok(HttpResponse::Ok().json(SettlementResult::from(record)))
}

route!(order_report => Get "/orders/{id}" impl LedgerStore, PaymentGateway, Notifier);
pub async fn order_report<B, G, N>(
    path: web::Path<i64>,
    api: web::Data<DeliveryApi<B, G, N>>,
    activity: web::Data<ActivityApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = path.into_inner();
    debug!("💻️ GET order report for {order_id}");
    let summary = api.order_summary(order_id).await?;
    let activity = activity.for_order(order_id).await?;
    Ok(HttpResponse::Ok().json(OrderReport { summary, activity }))
}

route!(recent_activity => Get "/activity" impl LedgerStore);
/// The most recent activity log entries, newest first. `limit` defaults to 50 and is capped at 500.
pub async fn recent_activity<B: LedgerStore>(
    query: web::Query<ActivityQuery>,
    api: web::Data<ActivityApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    debug!("💻️ GET recent activity. limit: {limit}");
    let entries = api.recent(limit).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// The live alert feed, as server-sent events. Every HIGH and CRITICAL activity entry is pushed here as it happens.
#[get("/alerts/stream")]
pub async fn alert_stream(query: web::Query<StreamQuery>, registry: web::Data<ConnectionRegistry>) -> HttpResponse {
    open_stream(ALERTS_TOPIC, query.into_inner(), registry.get_ref()).await
}

/// Live delivery status changes, as server-sent events.
#[get("/deliveries/stream")]
pub async fn delivery_stream(query: web::Query<StreamQuery>, registry: web::Data<ConnectionRegistry>) -> HttpResponse {
    open_stream(DELIVERIES_TOPIC, query.into_inner(), registry.get_ref()).await
}

async fn open_stream(topic: &str, query: StreamQuery, registry: &ConnectionRegistry) -> HttpResponse {
    let client = query.client.unwrap_or_else(|| "admin".to_string());
    info!("💻️ {client} opened the {topic} feed");
    let receiver = registry.subscribe(topic, &client).await;
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(sse_stream(receiver))
}
