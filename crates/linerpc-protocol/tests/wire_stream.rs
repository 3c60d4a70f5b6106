//! Feeds raw byte chunks through `LineBuffer` and `Frame::parse`, the
//! way the connection layer does.

use linerpc_protocol::{
    CommandFrame, DecodeOptions, ErrorCode, Frame, FrameError, LineBuffer, ResponseFrame, Value,
};

fn drain(buf: &mut LineBuffer) -> Vec<Result<Option<Frame>, FrameError>> {
    let mut out = Vec::new();
    while let Some(line) = buf.next_line().expect("no oversized lines") {
        out.push(Frame::parse(&line, &DecodeOptions::default()));
    }
    out
}

#[test]
fn test_mixed_frames_in_one_chunk_parse_in_order() {
    let mut buf = LineBuffer::new();
    buf.extend(b"add [2,3]\n\n0 5\nasync notify [42,\"hi\"]\n");

    let frames = drain(&mut buf);
    assert_eq!(frames.len(), 4);
    assert_eq!(
        frames[0],
        Ok(Some(Frame::Command(CommandFrame::new(
            "add",
            vec![Value::Integer(2), Value::Integer(3)]
        ))))
    );
    assert_eq!(frames[1], Ok(None));
    assert_eq!(
        frames[2],
        Ok(Some(Frame::Response(ResponseFrame::ok(Value::Integer(5)))))
    );
    assert_eq!(
        frames[3],
        Ok(Some(Frame::Command(CommandFrame::new_async(
            "notify",
            vec![Value::Integer(42), Value::from("hi")]
        ))))
    );
}

#[test]
fn test_frames_split_byte_by_byte_reassemble() {
    let wire = CommandFrame::new("echo", vec![Value::from("a/b \u{263a}")])
        .encode()
        .unwrap();

    let mut buf = LineBuffer::new();
    let mut frames = Vec::new();
    for byte in wire.as_bytes() {
        buf.extend(std::slice::from_ref(byte));
        frames.extend(drain(&mut buf));
    }

    assert_eq!(
        frames,
        vec![Ok(Some(Frame::Command(CommandFrame::new(
            "echo",
            vec![Value::from("a/b \u{263a}")]
        ))))]
    );
}

#[test]
fn test_encoded_response_parses_back_with_code() {
    let line = ResponseFrame::error(ErrorCode::ParseError, "error parsing command: x").encode();
    let mut buf = LineBuffer::new();
    buf.extend(line.as_bytes());
    let frames = drain(&mut buf);
    assert_eq!(
        frames,
        vec![Ok(Some(Frame::Response(ResponseFrame::error(
            ErrorCode::ParseError,
            "error parsing command: x"
        ))))]
    );
}
