use conduit_frame::encode_message;

use crate::cmd::input::{parse_options, resolve_payload};
use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let options = parse_options(&args.options)?;
    let payload = resolve_payload(&args.payload)?;

    let frame =
        encode_message(&options, &payload).map_err(|err| frame_error("encode failed", &err))?;
    print_encoded(&frame, format);
    Ok(SUCCESS)
}
