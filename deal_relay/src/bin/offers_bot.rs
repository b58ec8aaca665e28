use std::process::ExitCode;

use relay_bot_commons::*;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "WARN,deal_relay=debug,offers_bot=debug");
    }
    start_everything(deal_relay::commands::entry())
}
