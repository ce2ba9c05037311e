mod common;

use common::{TestResult, result_text, spawn_server};

#[tokio::test(flavor = "multi_thread")]
async fn executes_a_simple_expression() -> TestResult<()> {
    let session = spawn_server().await?;
    let result = session.execute_code("result = 1 + 1").await?;
    session.cancel().await?;

    assert_ne!(result.is_error, Some(true));
    let text = result_text(&result);
    assert!(text.contains("Execution successful"), "got: {text}");
    assert!(text.contains("Result:\n2"), "got: {text}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn advertises_the_execute_code_tool() -> TestResult<()> {
    let session = spawn_server().await?;
    let tools = session
        .call_tool("execute_code", serde_json::json!({ "code": "result = 'ok'" }))
        .await?;
    assert_ne!(tools.is_error, Some(true));

    let info = session.server_info().expect("server info");
    assert!(
        info.capabilities.tools.is_some(),
        "server does not advertise tools: {info:?}"
    );
    session.cancel().await?;
    Ok(())
}
