//! Shared-key middleware for the admin routes.
//!
//! Every request must carry the configured key in the `X-Admin-Key` header. Requests without the header get a
//! 401 Unauthorized response, and requests with the wrong key get a 403 Forbidden.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use dispatch_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{errors::ServerError, helpers::keys_match};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

pub struct AdminKeyMiddlewareFactory {
    key: Secret<String>,
}

impl AdminKeyMiddlewareFactory {
    pub fn new(key: Secret<String>) -> Self {
        AdminKeyMiddlewareFactory { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AdminKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminKeyMiddlewareService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct AdminKeyMiddlewareService<S> {
    key: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AdminKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let supplied = req.headers().get(ADMIN_KEY_HEADER).map(|v| v.to_str().map(String::from));
        let authorised = match supplied {
            None => {
                warn!("🔐️ Admin request to {} without an {ADMIN_KEY_HEADER} header. Denying access.", req.path());
                Err(ServerError::Unauthorized(format!("The {ADMIN_KEY_HEADER} header is required.")))
            },
            Some(Ok(key)) if keys_match(self.key.reveal(), &key) => Ok(()),
            Some(_) => {
                warn!("🔐️ Admin request to {} with an invalid key. Denying access.", req.path());
                Err(ServerError::Forbidden("Invalid admin key.".into()))
            },
        };
        Box::pin(async move {
            authorised?;
            trace!("🔐️ Admin key check for request ✅️");
            service.call(req).await
        })
    }
}
