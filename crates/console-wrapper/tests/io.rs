//! Tests for stream capture: echo round trips, flooding, buffering, encodings
#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};

use common::{script, wait_until};
use console_wrapper::{
    ConsoleWrapper, Encoding, EncodingSettings, Error, StreamSource, WrapperSettings,
};

const ECHO: &str = r#"while read line; do echo "$line"; done"#;
const FLOOD: &str = "while true; do echo ping; done";

#[test]
fn test_echo_round_trip() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ConsoleWrapper::with_defaults(script(&dir, "echo.sh", ECHO)).unwrap();

        const DATA: &str = "This data shall be echoed";

        wrapper.execute(None).unwrap();
        wrapper.write_to_console(DATA).await.unwrap();
        wrapper.output_received().wait().await;

        assert_eq!(wrapper.buffer().read_line(StreamSource::Output).as_deref(), Some(DATA));
        assert_eq!(wrapper.buffer().read_line(StreamSource::Output), None);

        wrapper.dispose(true).await;
    });
}

#[test]
fn test_flood_first_line_is_ping() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ConsoleWrapper::with_defaults(script(&dir, "flood.sh", FLOOD)).unwrap();

        wrapper.execute(None).unwrap();
        wrapper.output_received().wait().await;

        assert_eq!(
            wrapper.buffer().read_line(StreamSource::Output).as_deref(),
            Some("ping")
        );
        assert!(wrapper.is_executing(), "flooding child keeps running until killed");

        wrapper.kill().await.unwrap();
    });
}

#[test]
fn test_error_stream_is_captured_separately() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper =
            ConsoleWrapper::with_defaults(script(&dir, "err.sh", "echo oops >&2")).unwrap();

        wrapper.execute(None).unwrap();
        wrapper.error_received().wait().await;

        assert_eq!(
            wrapper.buffer().read_line(StreamSource::Error).as_deref(),
            Some("oops")
        );
        assert_eq!(wrapper.buffer().read_line(StreamSource::Output), None);

        wrapper.exited().wait().await;
    });
}

#[test]
fn test_buffer_replays_without_observers() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ConsoleWrapper::with_defaults(script(&dir, "echo.sh", ECHO)).unwrap();

        wrapper.execute(None).unwrap();
        wrapper.write_to_console("one").await.unwrap();
        wrapper.write_to_console("two").await.unwrap();

        wait_until("both lines to arrive", || {
            wrapper.buffer().len(StreamSource::Output) >= 2
        })
        .await;

        // replay preserves the order the child wrote
        assert_eq!(wrapper.buffer().read_line(StreamSource::Output).as_deref(), Some("one"));
        assert_eq!(wrapper.buffer().read_line(StreamSource::Output).as_deref(), Some("two"));

        wrapper.dispose(true).await;
    });
}

#[test]
fn test_latin1_output_decoding() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let settings = WrapperSettings::builder()
            .encoding(EncodingSettings {
                standard_output: Encoding::Latin1,
                ..Default::default()
            })
            .build();
        // 0o351 is 'é' in ISO-8859-1
        let wrapper =
            ConsoleWrapper::new(script(&dir, "latin1.sh", r"printf 'caf\351\n'"), settings)
                .unwrap();

        wrapper.execute(None).unwrap();
        wrapper.output_received().wait().await;

        assert_eq!(
            wrapper.buffer().read_line(StreamSource::Output).as_deref(),
            Some("café")
        );
    });
}

#[test]
fn test_panicking_observer_does_not_stop_delivery() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ConsoleWrapper::with_defaults(script(&dir, "echo.sh", ECHO)).unwrap();

        wrapper.on_output(|_| panic!("observer bug"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            wrapper.on_output(move |line| {
                seen.lock().unwrap().push(line.to_string());
            });
        }

        wrapper.execute(None).unwrap();
        wrapper.write_to_console("still delivered").await.unwrap();

        wait_until("second observer to run", || !seen.lock().unwrap().is_empty()).await;
        assert_eq!(seen.lock().unwrap()[0], "still delivered");

        wrapper.kill().await.unwrap();
    });
}

#[test]
fn test_observer_registering_an_observer_does_not_stall_delivery() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper =
            Arc::new(ConsoleWrapper::with_defaults(script(&dir, "echo.sh", ECHO)).unwrap());

        // a handler that adds another observer while delivery is in flight
        {
            let wrapper = wrapper.clone();
            wrapper.clone().on_output(move |_| wrapper.on_output(|_| {}));
        }

        wrapper.execute(None).unwrap();
        wrapper.write_to_console("first").await.unwrap();
        wrapper.write_to_console("second").await.unwrap();

        wait_until("both lines to arrive", || {
            wrapper.buffer().len(StreamSource::Output) >= 2
        })
        .await;

        wrapper.dispose(true).await;
    });
}

#[test]
fn test_write_without_input_redirection_is_invalid_state() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let settings = WrapperSettings::builder()
            .redirect_standard_input(false)
            .build();
        let wrapper =
            ConsoleWrapper::new(script(&dir, "flood.sh", FLOOD), settings).unwrap();

        wrapper.execute(None).unwrap();
        let err = wrapper.write_to_console("data").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(
            err.to_string(),
            "cannot write to console: standard input is not redirected"
        );

        wrapper.kill().await.unwrap();
    });
}

#[test]
fn test_try_kill_swallows_failures() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = ConsoleWrapper::with_defaults(script(&dir, "echo.sh", ECHO)).unwrap();

        // not executing yet: kill would error, try_kill reports false
        assert!(!wrapper.try_kill().await);

        wrapper.execute(None).unwrap();
        assert!(wrapper.try_kill().await);
        assert!(!wrapper.is_executing());
    });
}

#[test]
fn test_start_arguments_are_passed_to_the_child() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let wrapper =
            ConsoleWrapper::with_defaults(script(&dir, "args.sh", r#"echo "$1-$2""#)).unwrap();

        wrapper.execute(Some("hello world")).unwrap();
        wrapper.output_received().wait().await;

        assert_eq!(
            wrapper.buffer().read_line(StreamSource::Output).as_deref(),
            Some("hello-world")
        );
    });
}
