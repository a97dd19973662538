use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::web::api::{routes, AppContext};
use log::info;
use std::future::Future;
use warp::Filter;

pub struct WebServer {
    config: ServerConfig,
    ctx: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig, ctx: AppContext) -> Self {
        Self { config, ctx }
    }

    fn cors(&self) -> warp::cors::Builder {
        let cors = warp::cors()
            .allow_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_headers(vec!["content-type"])
            .max_age(3600);

        match self.config.allowed_origin.as_str() {
            "*" => cors.allow_any_origin(),
            origin => cors.allow_origin(origin.trim_end_matches('/')),
        }
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let addr = tokio::net::lookup_host(&target)
            .await?
            .next()
            .ok_or_else(|| Error::ConfigError(format!("cannot resolve listen address {}", target)))?;

        let app = routes(self.ctx.clone())
            .with(self.cors())
            .with(warp::log("coin_tracker::http"));

        let (bound, server) = warp::serve(app)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| Error::InternalError(format!("failed to bind {}: {}", addr, e)))?;

        info!("Web server listening on http://{}", bound);
        server.await;
        info!("Web server stopped");
        Ok(())
    }
}
