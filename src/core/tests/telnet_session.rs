mod common;

use ruche::services::LINE_ENDING;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const TELNET_SERVICE: &str = r#"
protocol = "telnet"
application = "busybox"
prompt = "router# "
motd = "BusyBox v1.31.1 built-in shell (ash)"

[[accounts]]
username = "admin"
password = "admin"

[simulator]
whoami = "root"
"#;

async fn exchange(harness: &common::Harness, input: &[u8]) -> String {
    let mut stream = harness.connect().await;
    stream.write_all(input).await.unwrap();
    let mut output = Vec::new();
    let mut chunk = [0u8; 1024];
    // a reset after the server hangs up ends the exchange like a FIN
    while let Ok(n) = stream.read(&mut chunk).await {
        if n == 0 {
            break;
        }
        output.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&output).into_owned()
}

#[tokio::test]
async fn four_bad_logins_close_the_connection() {
    let harness = common::start_service(TELNET_SERVICE);
    let output = exchange(
        &harness,
        b"root\r\nbad\r\nroot\r\nbad\r\nroot\r\nbad\r\nroot\r\nbad\r\n",
    )
    .await;
    assert_eq!(output.matches("login failed").count(), 4);
    assert!(!output.contains("router# "));

    let sink = harness.stop().await;
    let attempts = sink.events_of_type("telnet-password-authentication");
    assert_eq!(attempts.len(), 4);
    for attempt in &attempts {
        assert_eq!(attempt["details"]["telnet.username"], "root");
        assert_eq!(attempt["details"]["telnet.password"], "bad");
        assert_eq!(attempt["src_ip"], "127.0.0.1");
    }
    assert!(sink.events_of_type("telnet-command").is_empty());
}

#[tokio::test]
async fn shell_answers_from_simulator() {
    let harness = common::start_service(TELNET_SERVICE);
    let output = exchange(
        &harness,
        b"admin\r\nadmin\r\nwhoami\r\nwhoami \r\nWHOAMI\r\nls -al\r\nquit\r\n",
    )
    .await;

    assert!(output.contains("BusyBox v1.31.1"));
    assert!(output.contains(&format!("root{}", LINE_ENDING)));
    let not_found = format!("command not found{}", LINE_ENDING);
    assert_eq!(output.matches(not_found.as_str()).count(), 3);
    assert!(!output.contains("-bash"));
    assert!(output.contains("Goodbye!"));

    let sink = harness.stop().await;
    assert_eq!(sink.events_of_type("telnet-connect").len(), 1);
    let commands: Vec<String> = sink
        .events_of_type("telnet-command")
        .iter()
        .map(|e| e["details"]["command"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(commands, vec!["whoami", "whoami ", "WHOAMI", "ls -al", "quit"]);
}
