use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use linerpc::prelude::*;
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Example object
// ---------------------------------------------------------------------------

/// A handful of methods and one event, enough to poke at from a peer:
///
/// ```text
/// add [2,3]                          → 0 5
/// concat ["foo","bar"]               → 0 "foobar"
/// sum [[1,2,3]]                      → 0 6
/// sum [["a"]]                        → 1 "signature mismatch for command sum"
/// sleep_and_notify [100,"done"]      → 0 null, then async notify ["done"]
/// ```
#[derive(Default)]
struct ExampleObject {
    emitter: Mutex<Option<EventEmitter>>,
}

impl ExampleObject {
    fn add(a: i64, b: i64) -> i64 {
        a + b
    }

    fn concat(a: String, b: String) -> String {
        a + &b
    }

    fn sum(items: Vec<i64>) -> i64 {
        items.into_iter().sum()
    }

    fn sleep_and_notify(&self, msec: i64, message: String) {
        std::thread::sleep(Duration::from_millis(msec.max(0).unsigned_abs()));
        self.notify(message);
    }

    fn notify(&self, message: String) {
        let emitter = self.emitter.lock().clone();
        if let Some(emitter) = emitter {
            emitter.emit("notify", vec![message.into_value()]);
        }
    }
}

impl RpcObject for ExampleObject {
    fn interface(self: Arc<Self>) -> Interface {
        Interface::builder("ExampleObject")
            .method("add", ExampleObject::add)
            .method("concat", ExampleObject::concat)
            .method("sum", ExampleObject::sum)
            .method("sleep_and_notify", move |msec: i64, message: String| {
                self.sleep_and_notify(msec, message)
            })
            .event("notify", vec![TypeDescriptor::Text])
            .build()
    }

    fn attach(&self, emitter: EventEmitter) {
        *self.emitter.lock() = Some(emitter);
    }
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        let program = args.first().map(String::as_str).unwrap_or("example-peer");
        eprintln!("Usage: {program} <port>");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let rpc = Rpc::new();
    let example = rpc.register(Arc::new(ExampleObject::default()));
    rpc.bind_all_members(&example);

    let addr = format!("127.0.0.1:{}", args[1]);
    let peer = match rpc.connect_tcp(&addr).await {
        Ok(peer) => peer,
        Err(e) => {
            tracing::error!(%addr, error = %e, "could not reach peer");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, commands = ?rpc.commands(), "serving example object");

    peer.closed().await;
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use linerpc::linerpc_transport::IoStream;

    fn serve() -> (Rpc, Rpc) {
        let server = Rpc::new();
        let example = server.register(Arc::new(ExampleObject::default()));
        server.bind_all_members(&example);

        let client = Rpc::new();
        let (a, b) = tokio::io::duplex(4096);
        server.set_peer(IoStream::split(a));
        client.set_peer(IoStream::split(b));
        (server, client)
    }

    #[test]
    fn test_sum_adds_integers() {
        assert_eq!(ExampleObject::sum(vec![1, 2, 3]), 6);
        assert_eq!(ExampleObject::sum(vec![]), 0);
    }

    #[tokio::test]
    async fn test_sum_rejects_non_integer_elements() {
        let (_server, client) = serve();

        let total = client
            .call("sum", vec![Value::from(vec![1i64, 2, 3])])
            .await
            .unwrap();
        assert_eq!(total, Value::Integer(6));

        for bad in [Value::from(vec!["a"]), Value::List(vec![Value::Double(0.5)])] {
            match client.call("sum", vec![bad]).await {
                Err(RpcError::Remote { code, message }) => {
                    assert_eq!(code, ErrorCode::SystemError);
                    assert_eq!(message, "signature mismatch for command sum");
                }
                other => panic!("expected a signature mismatch, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_add_and_concat_over_the_wire() {
        let (_server, client) = serve();

        let sum = client
            .call("add", vec![Value::from(2), Value::from(3)])
            .await
            .unwrap();
        assert_eq!(sum, Value::Integer(5));

        let text = client
            .call("concat", vec![Value::from("foo"), Value::from("bar")])
            .await
            .unwrap();
        assert_eq!(text, Value::from("foobar"));
    }

    #[tokio::test]
    async fn test_sleep_and_notify_forwards_event() {
        struct Inbox(Mutex<Vec<String>>);

        impl RpcObject for Inbox {
            fn interface(self: Arc<Self>) -> Interface {
                Interface::builder("Inbox")
                    .method("notify", move |message: String| self.0.lock().push(message))
                    .build()
            }
        }

        let (_server, client) = serve();
        let inbox = Arc::new(Inbox(Mutex::new(Vec::new())));
        let obj = client.register(Arc::clone(&inbox));
        client.bind_incoming(&obj);

        client
            .call("sleep_and_notify", vec![Value::from(10), Value::from("done")])
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while inbox.0.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*inbox.0.lock(), vec!["done".to_string()]);
    }
}
