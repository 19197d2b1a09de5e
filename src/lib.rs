//! blotter - a file-backed blog engine.
//!
//! # Modules
//!
//! | Module     | Purpose                                                |
//! |------------|--------------------------------------------------------|
//! | `content`  | Storage, front matter, documents, incremental index    |
//! | `router`   | Pattern routes matched and generated in both directions |
//! | `template` | Template compiler, renderer and stale-aware cache      |
//! | `comments` | Post comments kept as JSON lines                       |
//! | `dispatch` | Per-request pipeline and the blog's route handlers     |
//! | `serve`    | `tiny_http` boundary                                   |
//! | `refresh`  | Background config refresh                              |
//! | `config`   | `blog.toml` loading and the global config handle       |

pub mod cli;
pub mod comments;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod logger;
pub mod refresh;
pub mod router;
pub mod serve;
pub mod template;
pub mod utils;
