pub mod handlers;
pub mod inkpress;

use std::io;

use actix_web::{App, HttpServer, middleware::Logger, web};
use log::{error, info};

use crate::inkpress::{Site, SiteConfig};

pub async fn run() -> io::Result<()> {
    let config = SiteConfig::load();
    let server_cfg = config.server.clone();

    let site = match Site::open(config) {
        Ok(site) => web::Data::new(site),
        Err(err) => {
            error!("unable to open site at {}: {err:#}", server_cfg.site_root);
            return Err(io::Error::other(err.to_string()));
        }
    };

    info!(
        "Inkpress is listening on: http://{}:{}",
        server_cfg.host, server_cfg.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(site.clone())
            .configure(handlers::config)
    })
    .bind((server_cfg.host.as_str(), server_cfg.port))?
    .run()
    .await
}
