// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static placeholder HTML, embedded at compile time the way the teacher
//! embeds its dashboard (`transport/mod.rs`'s `include_str!` for
//! `MUX_HTML`), served for sessions that aren't `running` yet (spec.md
//! §4.5).

pub const WAITING_HTML: &str = include_str!("../static/waiting.html");
pub const CLOSED_HTML: &str = include_str!("../static/closed.html");
