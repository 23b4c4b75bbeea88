//! Matching driver
//!
//! Every test that compares strings funnels through [`match_values`]: each
//! value is compared against each key until one pair matches. Count match
//! types compare the number of values instead. Captures staged by the
//! successful comparison become the new match values.

use super::env::RuntimeEnv;
use crate::objects::{Comparator, MatchContext, MatchType};
use crate::trace::TraceLevel;

/// Compare `values` against `keys`; true when any pair matches
pub fn match_values(
    env: &mut RuntimeEnv<'_, '_>,
    comparator: &'static dyn Comparator,
    match_type: &'static dyn MatchType,
    values: &[String],
    keys: &[String],
) -> bool {
    let mut ctx = MatchContext::new(
        comparator,
        env.settings.max_match_iterations,
        env.match_values.is_enabled(),
    );

    env.trace.line(
        TraceLevel::Matching,
        None,
        format_args!(
            "starting {} match with {} comparator",
            match_type.describe(),
            comparator.identifier()
        ),
    );
    env.trace.indent();
    let matched = if match_type.is_count() {
        match_count(env, &mut ctx, match_type, values.len(), keys)
    } else {
        match_each(env, &mut ctx, match_type, values, keys)
    };
    env.trace.outdent();
    env.trace.line(
        TraceLevel::Matching,
        None,
        format_args!("finishing match with result: {}", matched),
    );
    matched
}

fn match_count(
    env: &mut RuntimeEnv<'_, '_>,
    ctx: &mut MatchContext,
    match_type: &dyn MatchType,
    count: usize,
    keys: &[String],
) -> bool {
    for key in keys {
        let matched = match_type.match_count(ctx, count, key);
        env.trace.line(
            TraceLevel::Matching,
            None,
            format_args!("count {} against key `{}`: {}", count, key, matched),
        );
        if matched {
            return true;
        }
    }
    false
}

fn match_each(
    env: &mut RuntimeEnv<'_, '_>,
    ctx: &mut MatchContext,
    match_type: &dyn MatchType,
    values: &[String],
    keys: &[String],
) -> bool {
    for value in values {
        for key in keys {
            match match_type.match_key(ctx, value, key) {
                Ok(true) => {
                    env.trace.line(
                        TraceLevel::Matching,
                        None,
                        format_args!("value `{}` matches key `{}`", value, key),
                    );
                    if let Some(captured) = ctx.take_staged() {
                        env.match_values.commit(captured);
                    }
                    return true;
                }
                Ok(false) => {
                    env.trace.line(
                        TraceLevel::Matching,
                        None,
                        format_args!("value `{}` does not match key `{}`", value, key),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        match_type = match_type.identifier(),
                        key = %key,
                        error = %e,
                        "comparison failed, treating as no match"
                    );
                    env.trace.line(
                        TraceLevel::Matching,
                        None,
                        format_args!("comparing `{}` with key `{}` failed: {}", value, key, e),
                    );
                }
            }
        }
    }
    false
}
