use std::path::Path;

use actix_files::file_extension_to_mime;
use actix_web::guard::{self, GuardContext};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Route, web};
use log::{debug, error};
use serde::Deserialize;

use crate::inkpress::Site;
use crate::inkpress::blog::{self, ATOM_PATH};

pub fn config(conf: &mut web::ServiceConfig) {
    conf.service(
        web::resource("/{path:.*}")
            .guard(guard::fn_guard(is_blocked))
            .to(redirect_home),
    )
    .service(web::resource(ATOM_PATH).route(read().to(atom_handler)))
    .service(web::resource("/blog").route(read().to(blog_handler)))
    .service(web::resource("/blog/{post}").route(read().to(post_handler)))
    .service(
        web::resource("/.well-known/acme-challenge/{file}").route(read().to(challenge_handler)),
    )
    .service(web::resource("/{path:.*}").route(read().to(default_handler)));
}

/// GET, plus HEAD for clients that only want the headers.
fn read() -> Route {
    web::route().guard(guard::Any(guard::Get()).or(guard::Head()))
}

fn is_blocked(ctx: &GuardContext<'_>) -> bool {
    let path = ctx.head().uri.path();
    ctx.app_data::<web::Data<Site>>()
        .is_some_and(|site| site.config().routes.blocked.iter().any(|b| b == path))
}

async fn redirect_home() -> HttpResponse {
    redirect_to("/")
}

fn redirect_to(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Scheme and host the client used, honouring proxy headers.
fn base_url(req: &HttpRequest) -> String {
    let scheme = ["x-forwarded-proto", "x-forwarded-protocol"]
        .iter()
        .find_map(|name| {
            req.headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("http");
    format!("{scheme}://{}", req.connection_info().host())
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// MIME type for the file's extension, if it is one we know.
fn known_mime(file: &str) -> Option<String> {
    let ext = Path::new(file).extension()?.to_str()?;
    let mime = file_extension_to_mime(ext);
    (mime.essence_str() != "application/octet-stream").then(|| mime.to_string())
}

async fn atom_handler(site: web::Data<Site>, req: HttpRequest) -> HttpResponse {
    let base = base_url(&req);
    let body: String = site
        .cache()
        .get_or_compute(&format!("atom:{base}{ATOM_PATH}"), || {
            blog::render_atom(&site, &base)
        });
    HttpResponse::Ok()
        .content_type("application/atom+xml")
        .body(body)
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    id: Option<String>,
}

async fn blog_handler(site: web::Data<Site>, query: web::Query<StreamQuery>) -> HttpResponse {
    let Some(id) = query.id.as_deref() else {
        return redirect_to("/");
    };
    let Ok(start) = id.parse::<usize>() else {
        return redirect_to("/");
    };

    let body: String = site
        .cache()
        .get_or_compute(&format!("blog:/blog?id={id}"), || blog::render_stream(&site, start));
    html(body)
}

async fn post_handler(
    site: web::Data<Site>,
    post: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let slug = post.into_inner().to_lowercase();
    let body: String = site.cache().get_or_compute(&format!("post:blog/{slug}"), || {
        site.render_post(&slug).unwrap_or_else(|err| {
            debug!("no post for {slug}: {err:#}");
            String::new()
        })
    });

    if !body.is_empty() {
        return html(body);
    }
    if known_mime(&slug).is_some() {
        default_handler(site, req).await
    } else {
        redirect_to("/")
    }
}

async fn challenge_handler(site: web::Data<Site>, file: web::Path<String>) -> HttpResponse {
    let path = format!(".well-known/acme-challenge/{}", file.into_inner());
    if !site.paths().exists(&path) || site.paths().is_dir(&path) {
        return HttpResponse::NotFound().finish();
    }
    match site.read_file(&path) {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(bytes),
        Err(err) => {
            error!("{err:#}");
            HttpResponse::NotFound().finish()
        }
    }
}

async fn default_handler(site: web::Data<Site>, req: HttpRequest) -> HttpResponse {
    let url = req.path();
    let mut pathname = clean_path(&url.to_lowercase());
    if pathname != "/" && url.ends_with('/') {
        pathname.push('/');
    }

    if let Some(dir) = pathname.strip_suffix("/index.html") {
        let location = format!("/{}", dir.trim_start_matches('/'));
        return HttpResponse::MovedPermanently()
            .insert_header((header::LOCATION, location))
            .finish();
    }

    let file = if pathname.ends_with('/') {
        format!("{pathname}index.html")
    } else {
        pathname.clone()
    };
    let file = file.trim_start_matches('/');
    let is_html = file.ends_with(".html");
    let paths = site.paths();

    if let (Some(mime), false) = (known_mime(file), is_html) {
        if !paths.exists(file) {
            return HttpResponse::NotFound().finish();
        }
        if paths.is_dir(file) {
            return redirect_to("/");
        }
        let bytes: Vec<u8> = site.cache().get_or_compute(&format!("default:{file}"), || {
            site.read_file(file).unwrap_or_else(|err| {
                error!("{err:#}");
                Vec::new()
            })
        });
        return HttpResponse::Ok()
            .content_type(mime)
            .insert_header((header::CACHE_CONTROL, "private, max-age=0"))
            .insert_header((header::EXPIRES, "-1"))
            .body(bytes);
    }

    if !paths.exists(file) {
        if file == "index.html" {
            return HttpResponse::NotFound().finish();
        }
        return redirect_to(&parent_dir(&pathname));
    }
    if paths.is_dir(file) || !is_html {
        return redirect_to(&format!("{}/", pathname.trim_end_matches('/')));
    }

    let base = base_url(&req);
    let site = site.into_inner();
    let body: String = site.cache().get_or_compute(&format!("default:{file}"), || {
        site.render_page(file, &base).unwrap_or_else(|err| {
            error!("failed to render {file}: {err:#}");
            String::new()
        })
    });
    if body.is_empty() {
        return HttpResponse::InternalServerError().finish();
    }
    html(body)
}

/// Lexically resolve `.`, `..` and repeated slashes. The result is rooted
/// and has no trailing slash (except for `/` itself).
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_dir(pathname: &str) -> String {
    let trimmed = pathname.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}
