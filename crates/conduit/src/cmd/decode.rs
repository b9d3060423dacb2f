use conduit_frame::decode_message;

use crate::cmd::input::parse_hex;
use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = parse_hex(&args.hex)?;
    let message = decode_message(frame.into()).map_err(|err| frame_error("decode failed", &err))?;
    print_decoded(&message, format);
    Ok(SUCCESS)
}
