use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("conduit {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: conduit");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CONDUIT_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "frame: max_options={}, max_key_len={}, max_value_len={}, max_payload_len={}",
        conduit_frame::MAX_OPTIONS,
        conduit_frame::MAX_KEY_LEN,
        conduit_frame::MAX_VALUE_LEN,
        conduit_frame::MAX_PAYLOAD_LEN
    );
    println!("features: rpc={}, cli=true", cfg!(feature = "rpc"));

    Ok(SUCCESS)
}
