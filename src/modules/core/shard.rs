//! shard - deterministic bucket assignment for staged rollouts

use async_trait::async_trait;
use md5::{Digest, Md5};
use tracing::debug;

use crate::modules::{
    descriptor::{ArgType, Descriptor},
    error::ActionError,
    interface::{Action, Invocation, OpResult},
    runtime::Module,
};

pub const MIN_SHARD_SIZE: i64 = 10;

pub fn descriptor() -> Descriptor {
    Descriptor::new(
        "shard",
        &[
            ("identifier??", ArgType::Str),
            ("shard_size", ArgType::Int),
            ("seed", ArgType::Str),
        ],
    )
}

pub fn module() -> Module {
    Module::new(descriptor(), ShardAction)
}

/// Bucket for `identifier` in `[0, shard_size)`: the first seven hex digits
/// of `md5(identifier + seed)` read as an integer, modulo `shard_size`.
pub fn seeded_shard(identifier: &str, shard_size: i64, seed: &str) -> Result<i64, ActionError> {
    if shard_size < MIN_SHARD_SIZE {
        return Err(ActionError::ShardSize(shard_size));
    }

    let digest = Md5::digest(format!("{identifier}{seed}").as_bytes());
    let prefix = (u32::from(digest[0]) << 20)
        | (u32::from(digest[1]) << 12)
        | (u32::from(digest[2]) << 4)
        | (u32::from(digest[3]) >> 4);

    Ok(i64::from(prefix) % shard_size)
}

fn local_hostname() -> Result<String, ActionError> {
    let name = hostname::get().map_err(ActionError::Hostname)?;
    Ok(name.to_string_lossy().into_owned())
}

pub struct ShardAction;

#[async_trait]
impl Action for ShardAction {
    async fn run(&self, invocation: Invocation) -> Result<Option<OpResult>, ActionError> {
        let args = &invocation.args;
        let identifier = match args.optional::<String>("identifier")? {
            Some(id) => id,
            None => local_hostname()?,
        };
        let shard_size: i64 = args.require("shard_size")?;
        let seed: String = args.require("seed")?;

        let shard = seeded_shard(&identifier, shard_size, &seed)?;
        debug!(module = %invocation.name, identifier = %identifier, shard, "computed shard");

        Ok(Some(OpResult::succeeded(invocation.name, shard.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_prefix_value(identifier: &str, seed: &str) -> i64 {
        let hex = format!("{:x}", Md5::digest(format!("{identifier}{seed}").as_bytes()));
        i64::from_str_radix(&hex[..7], 16).unwrap()
    }

    #[test]
    fn test_matches_hex_prefix_definition() {
        for (id, seed) in [("host1", "x"), ("web-42.example.com", "rollout-7"), ("", "")] {
            assert_eq!(
                seeded_shard(id, 100, seed).unwrap(),
                hex_prefix_value(id, seed) % 100
            );
        }
    }

    #[test]
    fn test_small_shard_size_rejected() {
        assert!(matches!(
            seeded_shard("host1", 9, "x"),
            Err(ActionError::ShardSize(9))
        ));
        assert!(seeded_shard("host1", 10, "x").is_ok());
    }

    #[test]
    fn test_seed_changes_assignment_somewhere() {
        let differs = (0..50)
            .map(|i| format!("host{i}"))
            .any(|h| seeded_shard(&h, 1000, "a").unwrap() != seeded_shard(&h, 1000, "b").unwrap());
        assert!(differs);
    }
}
