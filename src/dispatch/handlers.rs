//! Route handlers of the blog surface.
//!
//! | Route           | Template         | Layout |
//! |-----------------|------------------|--------|
//! | `index`         | `index.html`     | yes    |
//! | `index_feed`    | `feed.xml`       | no     |
//! | `post`          | `post.html`      | yes    |
//! | `archive`       | `archive.html`   | yes    |
//! | `category_feed` | `feed.xml`       | no     |
//! | `category`      | `category.html`  | yes    |
//! | `tag`           | `category.html`  | yes    |
//! | `comments`      | `_comments.html` | no     |
//! | `page`          | `page.html`      | yes    |

use super::{Context, DispatchError, Outcome};
use crate::{
    comments::{Comment, CommentError},
    content::Document,
    log,
    router::Params,
    utils::date::month_name,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

type HandlerResult = Result<Outcome, DispatchError>;

fn values(docs: &[Arc<Document>]) -> Vec<Value> {
    docs.iter().map(|doc| doc.to_value()).collect()
}

/// Positional integer parameter.
fn number<T: std::str::FromStr>(params: &Params, index: usize) -> Option<T> {
    params.at(index)?.parse().ok()
}

pub fn index(ctx: &Context<'_>, _: &Params) -> HandlerResult {
    let posts = ctx.index.recent_posts(ctx.config.content.recent);
    Ok(Outcome::render("index.html", json!({ "posts": values(posts) })))
}

pub fn index_feed(ctx: &Context<'_>, _: &Params) -> HandlerResult {
    let posts = ctx.index.recent_posts(ctx.config.content.recent);
    Ok(Outcome::partial(
        "feed.xml",
        json!({ "title": ctx.config.base.title, "posts": values(posts) }),
    ))
}

pub fn post(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let (Some(year), Some(month)) = (number::<i32>(params, 0), number::<u32>(params, 1)) else {
        return Ok(Outcome::NotFound);
    };
    let slug = params.get("slug").unwrap_or_default();
    // Identity months are unpadded: `/2008/09/x` finds `2008/9/x`.
    let path = format!("{year}/{month}/{slug}");

    let Some(doc) = ctx.index.find_by_path(&path).filter(|doc| doc.is_post()) else {
        return Ok(Outcome::NotFound);
    };
    let comments = ctx.comments.list(doc.path())?;

    Ok(Outcome::render(
        "post.html",
        json!({
            "post": doc.to_value(),
            "comments": comments,
            "comments_enabled": ctx.config.comments.enable,
        }),
    ))
}

pub fn archive(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let (Some(year), Some(month)) = (number::<i32>(params, 0), number::<u32>(params, 1)) else {
        return Ok(Outcome::NotFound);
    };
    let Some(name) = month_name(month) else {
        return Ok(Outcome::NotFound);
    };

    let posts = ctx.index.posts_for_month(year, month);
    Ok(Outcome::render(
        "archive.html",
        json!({
            "year": year,
            "month": month,
            "month_name": name,
            "posts": values(posts),
        }),
    ))
}

pub fn category_feed(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let Some(category) = params.get("name").and_then(|slug| ctx.index.find_category(slug)) else {
        return Ok(Outcome::NotFound);
    };
    let posts = ctx.index.posts_for_category(category);
    Ok(Outcome::partial(
        "feed.xml",
        json!({
            "title": format!("{}: {category}", ctx.config.base.title),
            "category": category,
            "posts": values(posts),
        }),
    ))
}

pub fn category(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let Some(category) = params.get("name").and_then(|slug| ctx.index.find_category(slug)) else {
        return Ok(Outcome::NotFound);
    };
    let posts = ctx.index.posts_for_category(category);
    Ok(Outcome::render(
        "category.html",
        json!({
            "name": category,
            "category": category,
            "posts": values(posts),
        }),
    ))
}

pub fn tag(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let tag = params.get("name").unwrap_or_default();
    let posts = ctx.index.posts_with_tags(&[tag]);
    if posts.is_empty() {
        return Ok(Outcome::NotFound);
    }
    Ok(Outcome::render(
        "category.html",
        json!({
            "name": format!("Tag: {tag}"),
            "tag": tag,
            "posts": values(&posts),
        }),
    ))
}

/// `POST /comments`: preview or store a comment on the post in `path`.
pub fn comments(ctx: &Context<'_>, _: &Params) -> HandlerResult {
    if !ctx.config.comments.enable {
        return Ok(Outcome::NotFound);
    }
    let request = ctx.request;
    let path = request.param("path").unwrap_or_default().trim_matches('/');
    let Some(doc) = ctx.index.find_by_path(path).filter(|doc| doc.is_post()) else {
        return Ok(Outcome::NotFound);
    };

    let comment = match Comment::from_params(&request.params, Utc::now()) {
        Ok(comment) => comment,
        Err(err @ CommentError::Missing(_)) => return Ok(Outcome::Invalid(err.to_string())),
        Err(err) => return Err(err.into()),
    };

    let comments = if request.param("preview").is_some_and(|v| !v.is_empty()) {
        vec![comment]
    } else {
        ctx.comments.add(doc.path(), &comment)?;
        log!("comment"; "{} on {}", comment.name, doc.path());
        ctx.comments.list(doc.path())?
    };

    Ok(Outcome::partial(
        "_comments.html",
        json!({ "post": doc.to_value(), "comments": comments }),
    ))
}

pub fn page(ctx: &Context<'_>, params: &Params) -> HandlerResult {
    let path = params.get("path").unwrap_or_default().trim_matches('/');
    let Some(doc) = ctx.index.find_by_path(path) else {
        return Ok(Outcome::NotFound);
    };
    Ok(Outcome::render("page.html", json!({ "page": doc.to_value() })))
}
