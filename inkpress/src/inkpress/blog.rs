use chrono::{DateTime, Utc};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::inkpress::escape::escape_html;
use crate::inkpress::posts::{DateFormat, Post};
use crate::inkpress::site::Site;
use crate::inkpress::template::no_partials;
use crate::inkpress::truncate::truncate_with;
use crate::inkpress::view::View;

pub const ATOM_PATH: &str = "/blog/atom.xml";

/// Site template appended to a stream chunk when more posts follow.
const LOAD_MORE_TEMPLATE: &str = "stream.html";

/// Item markup around a post summary. The summary itself is inserted between
/// the two halves as-is, so post bodies are never read as templates.
const ITEM_HEAD: &str = "<div class='item'><div class='date'>{{date}}</div>\n\
<h1><a href='{{{url}}}'>{{title}}</a></h1>\n\
<div class='content'>";

const ITEM_TAIL: &str = "\n</div>\
{{#more}}<div class='more'><a href='{{{url}}}'>Read more&hellip;</a></div>\n{{/more}}\
</div>\n";

static DOUBLE_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s\s").expect("double whitespace regex"));

/// One chunk of the blog stream: up to a page of post summaries starting at
/// the `start`-th visible post, followed by the "load more" block if any
/// posts remain.
pub fn render_stream(site: &Site, start: usize) -> String {
    let render = &site.config().render;
    let mut posts = site.visible_posts().skip(start);
    let page: Vec<Post> = posts.by_ref().take(render.page_size).collect();
    let has_more = posts.next().is_some();

    let engine = site.engine();
    let mut output = String::new();
    for post in &page {
        let content = DOUBLE_SPACE_RE.replace_all(post.content(), " ");
        let summary = truncate_with(&content, render.stream_budget, render.overshoot_tolerance);
        let item = View::new()
            .with("url", post.url_path())
            .with("title", post.title())
            .with("date", display_date(post))
            .with("more", summary.was_truncated);

        output.push_str(&engine.render(ITEM_HEAD, &item, &no_partials));
        output.push_str(&summary.html);
        output.push_str(&engine.render(ITEM_TAIL, &item, &no_partials));
    }

    if has_more {
        match site.read_template(LOAD_MORE_TEMPLATE) {
            Ok(template) => {
                let next = start + page.len();
                let view = View::new().with("url", format!("/blog?id={next}"));
                output.push_str(&site.render(&template, &view));
            }
            Err(err) => warn!("blog stream has more posts but no placeholder: {err:#}"),
        }
    }

    output
}

fn display_date(post: &Post) -> String {
    match post.date() {
        Some(date) => DateFormat::User.format(&date),
        None => post.get("date").unwrap_or_default().to_string(),
    }
}

/// Atom document for the most recent posts. `base_url` is scheme plus host.
pub fn render_atom(site: &Site, base_url: &str) -> String {
    let render = &site.config().render;
    let name = escape_html(&site.name());
    let posts: Vec<Post> = site.visible_posts().take(render.feed_entries).collect();
    let updated = posts
        .iter()
        .filter_map(Post::updated)
        .max()
        .unwrap_or_else(Utc::now);

    let mut lines = vec![
        "<?xml version='1.0' encoding='UTF-8'?>".to_string(),
        "<feed xmlns='http://www.w3.org/2005/Atom'>".to_string(),
        format!("<title>{name}</title>"),
        format!("<id>{base_url}/</id>"),
        format!("<icon>{base_url}/favicon.ico</icon>"),
        format!("<updated>{}</updated>", atom_date(&updated)),
        format!("<author><name>{name}</name></author>"),
        format!("<link rel='alternate' type='text/html' href='{base_url}/' />"),
        format!("<link rel='self' type='application/atom+xml' href='{base_url}{ATOM_PATH}' />"),
    ];

    for post in &posts {
        let url = format!("{base_url}{}", post.url_path());
        let title = escape_html(post.title());
        let published = post.date().unwrap_or_default();
        let content = truncate_with(post.content(), render.feed_budget, render.overshoot_tolerance);

        lines.push("<entry>".to_string());
        lines.push(format!("<id>{url}</id>"));
        if let Some(author) = post.get("author").filter(|a| *a != site.name()) {
            lines.push(format!("<author><name>{}</name></author>", escape_html(author)));
        }
        lines.push(format!("<published>{}</published>", atom_date(&published)));
        lines.push(format!(
            "<updated>{}</updated>",
            atom_date(&post.updated().unwrap_or(published))
        ));
        lines.push(format!("<title type='text'>{title}</title>"));
        lines.push(format!("<content type='html'>{}</content>", escape_html(&content.html)));
        lines.push(format!(
            "<link rel='alternate' type='text/html' href='{url}' title='{title}' />"
        ));
        lines.push("</entry>".to_string());
    }

    lines.push("</feed>".to_string());
    lines.join("\n")
}

fn atom_date(date: &DateTime<Utc>) -> String {
    DateFormat::Atom.format(date)
}
