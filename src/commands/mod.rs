pub mod admin;
pub mod karma;
pub mod permissions;
pub mod ping;
pub mod prefix;

use crate::perms::CommandPolicy;
use crate::{Data, Error};

fn with_policy(
    mut command: poise::Command<Data, Error>,
    policy: CommandPolicy,
) -> poise::Command<Data, Error> {
    command.custom_data = Box::new(policy);
    command
}

/// Every command the bot registers, tagged with its compiled-in default
/// policy. Commands without a tag fall back to admin-only.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        with_policy(ping::ping(), CommandPolicy::everyone()),
        with_policy(prefix::prefix(), CommandPolicy::everyone()),
        prefix::changeprefix(),
        with_policy(karma::karma(), CommandPolicy::everyone()),
        karma::karmaemoji(),
        permissions::permissions(),
        admin::sleep(),
        admin::wake(),
        admin::shutdown(),
    ]
}
