// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Condition polling with timeout.
//!
//! This is the only place the controller suspends. The predicate receives
//! mutable access to a caller-supplied context so it can talk to the machine
//! (and may have side effects such as restarting the beam).

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant};

/// Default interval between predicate evaluations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub type PredicateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Poll `predicate` until it holds or `timeout` has elapsed.
///
/// The predicate is evaluated immediately; after that the task sleeps for
/// `interval` between evaluations. Once `timeout` has elapsed since the first
/// evaluation, returns `false` without evaluating again.
pub async fn wait<C, F>(ctx: &mut C, timeout: Duration, interval: Duration, mut predicate: F) -> bool
where
    C: ?Sized + Send,
    F: for<'a> FnMut(&'a mut C) -> PredicateFuture<'a, bool> + Send,
{
    let result = try_wait(ctx, timeout, interval, |c| {
        let check = predicate(c);
        Box::pin(async move { Ok::<bool, Infallible>(check.await) })
    })
    .await;
    match result {
        Ok(done) => done,
        Err(never) => match never {},
    }
}

/// Like [`wait`], but a predicate error stops polling and is returned as-is.
pub async fn try_wait<C, E, F>(
    ctx: &mut C,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<bool, E>
where
    C: ?Sized + Send,
    F: for<'a> FnMut(&'a mut C) -> PredicateFuture<'a, Result<bool, E>> + Send,
{
    let started = Instant::now();
    loop {
        if predicate(&mut *ctx).await? {
            return Ok(true);
        }
        time::sleep(interval).await;
        if started.elapsed() >= timeout {
            return Ok(false);
        }
    }
}
