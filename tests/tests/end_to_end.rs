//! End-to-end sessions: a real client and a real server wired through an
//! in-memory pipe, exercising the full handshake and every method family.

use std::sync::Arc;

use assert_matches::assert_matches;
use mcp_runtime::client::ClientEvent;
use mcp_runtime::error::{codes, McpError};
use mcp_runtime::messages::{
    CompletionArgument, CompletionRef, CompletionResult, CreateMessageRequest,
    CreateMessageResponse, GetPromptResponse, Prompt, PromptMessage, Resource, ResourceContent,
    ResourceTemplate, Root, SamplingContent, SamplingMessage, SamplingRole, TaskStatus, Tool,
    ToolContent,
};
use mcp_runtime::server::{McpServer, ServerEvent, TaskHandle};
use mcp_runtime::session::SessionState;
use mcp_runtime_tests::{default_pair, setup_test_logging};
use serde_json::json;

/// Connect both halves of a linked pair and return them ready.
async fn ready_pair(
    mut client: mcp_runtime::client::McpClient,
    mut server: McpServer,
) -> (mcp_runtime::client::McpClient, McpServer) {
    server.start().await.expect("server start");
    let negotiated = client.connect().await.expect("client connect");
    assert_eq!(negotiated.server_info.name, "s");
    assert_eq!(client.state(), SessionState::Ready);
    (client, server)
}

#[tokio::test]
async fn handshake_negotiates_version_and_capabilities() {
    setup_test_logging();
    let (client, mut server) = default_pair();
    server.register_tool(Tool::new("echo"), |_| Ok(vec![ToolContent::text("")]));

    let mut server_events = server.take_events().unwrap();
    let (client, server) = ready_pair(client, server).await;

    let negotiated = client.server().unwrap();
    assert_eq!(
        negotiated.protocol_version.as_str(),
        mcp_runtime::PROTOCOL_VERSION
    );
    assert!(negotiated.capabilities.standard.tools.is_some());
    assert!(negotiated.capabilities.standard.resources.is_none());

    let event = server_events.recv().await.unwrap();
    assert_matches!(event, ServerEvent::Initialized { client_info: Some(ref info) } if info.name == "c");
    assert_eq!(server.state(), SessionState::Ready);
}

#[tokio::test]
async fn tool_call_round_trip() {
    setup_test_logging();
    let (client, server) = default_pair();
    server.register_tool(Tool::new("echo"), |args| {
        let text = args
            .and_then(|a| a.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();
        Ok(vec![ToolContent::text(text)])
    });

    let (client, _server) = ready_pair(client, server).await;

    let response = client
        .call_tool("echo", Some(json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.content, vec![ToolContent::text("hi")]);
    assert_eq!(response.is_error, Some(false));

    let listed = client.list_tools().await.unwrap();
    assert_eq!(listed.tools.len(), 1);
    assert_eq!(listed.tools[0].name, "echo");
}

#[tokio::test]
async fn tool_handler_error_becomes_method_error() {
    setup_test_logging();
    let (client, server) = default_pair();
    server.register_tool(Tool::new("broken"), |_| {
        Err(McpError::internal("handler exploded"))
    });

    let (client, _server) = ready_pair(client, server).await;

    let result = client.call_tool("broken", None).await;
    assert_matches!(result, Err(McpError::Method { code, .. }) if code == codes::INTERNAL_ERROR);
}

#[tokio::test]
async fn resources_and_templates() {
    setup_test_logging();
    let (client, server) = default_pair();
    server.register_resource(
        Resource::new("file:///readme").with_name("Readme"),
        |uri| Ok(vec![ResourceContent::text(uri, "hello")]),
    );
    server
        .register_resource_template(ResourceTemplate::new("file:///notes/{id}"), |uri, vars| {
            let id = vars.get("id").cloned().unwrap_or_default();
            Ok(vec![ResourceContent::text(uri, format!("note:{id}"))])
        })
        .unwrap();

    let (client, _server) = ready_pair(client, server).await;

    let listed = client.list_resources().await.unwrap();
    assert_eq!(listed.resources.len(), 1);

    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(templates.resource_templates.len(), 1);
    assert_eq!(
        templates.resource_templates[0].uri_template,
        "file:///notes/{id}"
    );

    let read = client.read_resource("file:///readme").await.unwrap();
    assert_eq!(read.contents[0].text.as_deref(), Some("hello"));

    let read = client.read_resource("file:///notes/42").await.unwrap();
    assert_eq!(read.contents[0].text.as_deref(), Some("note:42"));

    let missing = client.read_resource("file:///other").await;
    assert_matches!(missing, Err(McpError::Method { code, ref message, .. })
        if code == codes::INVALID_PARAMS && message == "Resource not found");
}

#[tokio::test]
async fn subscription_delivers_update_events() {
    setup_test_logging();
    let (mut client, server) = default_pair();
    server.register_resource(Resource::new("file:///watched"), |uri| {
        Ok(vec![ResourceContent::text(uri, "v1")])
    });

    let mut events = client.take_events().unwrap();
    let (client, server) = ready_pair(client, server).await;

    client.subscribe_resource("file:///watched").await.unwrap();
    assert!(server.notify_resource_updated("file:///watched").await.unwrap());

    let event = loop {
        match events.recv().await.unwrap() {
            ClientEvent::ResourceUpdated { uri } => break uri,
            _ => continue,
        }
    };
    assert_eq!(event, "file:///watched");

    // Unsubscribed URIs are silent; unknown unsubscribes succeed.
    client.unsubscribe_resource("file:///watched").await.unwrap();
    client.unsubscribe_resource("file:///watched").await.unwrap();
    assert!(!server.notify_resource_updated("file:///watched").await.unwrap());
}

#[tokio::test]
async fn prompt_rendering() {
    setup_test_logging();
    let (client, server) = default_pair();
    server.register_prompt(
        Prompt::new("greet").with_description("Greets someone"),
        |args| {
            let name = args.get("name").cloned().unwrap_or_else(|| "world".to_string());
            Ok(GetPromptResponse {
                description: Some("greeting".to_string()),
                messages: vec![PromptMessage::user_text(format!("hello {name}"))],
            })
        },
    );

    let (client, _server) = ready_pair(client, server).await;

    let listed = client.list_prompts().await.unwrap();
    assert_eq!(listed.prompts[0].name, "greet");

    let rendered = client
        .get_prompt(
            "greet",
            Some([("name".to_string(), "mcp".to_string())].into_iter().collect()),
        )
        .await
        .unwrap();
    assert_eq!(rendered.description.as_deref(), Some("greeting"));
    assert_eq!(rendered.messages.len(), 1);
}

#[tokio::test]
async fn completion_round_trip() {
    setup_test_logging();
    let (client, server) = default_pair();
    server.set_completion_handler(|reference, argument| {
        let prefix = match reference {
            CompletionRef::Prompt { name } => name,
            CompletionRef::Resource { uri } => uri,
        };
        Ok(CompletionResult {
            values: vec![format!("{prefix}:{}", argument.value)],
            total: Some(1),
            has_more: Some(false),
        })
    });

    let (client, _server) = ready_pair(client, server).await;

    let completion = client
        .complete(
            CompletionRef::Prompt {
                name: "greet".to_string(),
            },
            CompletionArgument {
                name: "name".to_string(),
                value: "mc".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(completion.completion.values, vec!["greet:mc"]);
}

#[tokio::test]
async fn ping_in_both_directions() {
    setup_test_logging();
    let (client, server) = default_pair();
    let (client, server) = ready_pair(client, server).await;

    client.ping().await.unwrap();
    server.ping().await.unwrap();
}

#[tokio::test]
async fn async_task_lifecycle() {
    setup_test_logging();
    let (mut client, server) = default_pair();
    let (handle_tx, mut handle_rx) = tokio::sync::mpsc::unbounded_channel::<TaskHandle>();
    server.register_async_tool(Tool::new("slow"), move |_args, handle| {
        handle_tx.send(handle).unwrap();
        Ok(None)
    });

    let mut events = client.take_events().unwrap();
    let (client, _server) = ready_pair(client, server).await;

    let response = client.call_tool("slow", None).await.unwrap();
    let task = response.task.expect("async call carries a task");
    assert_eq!(task.status, TaskStatus::Working);
    assert!(response.content.is_empty());

    // Polling before completion fails with the documented message.
    let early = client.task_result(&task.task_id).await;
    assert_matches!(early, Err(McpError::Method { code, ref message, .. })
        if code == codes::INVALID_PARAMS && message == "Task not yet completed");

    let fetched = client.get_task(&task.task_id).await.unwrap();
    assert_eq!(fetched.status, TaskStatus::Working);

    // Complete from the worker side and observe the status notification.
    let handle = handle_rx.recv().await.unwrap();
    handle.complete(vec![ToolContent::text("done")]).await.unwrap();

    let updated = loop {
        match events.recv().await.unwrap() {
            ClientEvent::TaskStatus { task } => break task,
            _ => continue,
        }
    };
    assert_eq!(updated.status, TaskStatus::Completed);

    let stored = client.task_result(&task.task_id).await.unwrap();
    assert_eq!(stored.content, vec![ToolContent::text("done")]);

    let all = client.list_tasks().await.unwrap();
    assert_eq!(all.tasks.len(), 1);
}

#[tokio::test]
async fn task_cancellation_via_client() {
    setup_test_logging();
    let (mut client, server) = default_pair();
    server.register_async_tool(Tool::new("slow"), |_args, _handle| Ok(None));

    let mut events = client.take_events().unwrap();
    let (client, _server) = ready_pair(client, server).await;

    let response = client.call_tool("slow", None).await.unwrap();
    let task = response.task.unwrap();

    client.cancel_task(&task.task_id).await.unwrap();
    let updated = loop {
        match events.recv().await.unwrap() {
            ClientEvent::TaskStatus { task } => break task,
            _ => continue,
        }
    };
    assert_eq!(updated.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn sampling_round_trip() {
    setup_test_logging();
    let (mut client, server) = default_pair();
    let mut events = client.take_events().unwrap();
    let (client, server) = ready_pair(client, server).await;
    let client = Arc::new(client);

    // Host application answers sampling requests as they arrive.
    let answerer = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Some(ClientEvent::SamplingRequested {
                        request_id,
                        request,
                    }) => {
                        assert_eq!(request.max_tokens, Some(32));
                        client
                            .respond_sampling(
                                &request_id,
                                CreateMessageResponse {
                                    role: SamplingRole::Assistant,
                                    content: SamplingContent::Text {
                                        text: "sampled".to_string(),
                                    },
                                    model: "test-model".to_string(),
                                    stop_reason: Some("endTurn".to_string()),
                                },
                            )
                            .await
                            .unwrap();
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        })
    };

    let result = server
        .request_sampling(CreateMessageRequest {
            messages: vec![SamplingMessage::user_text("write a haiku")],
            model_preferences: None,
            system_prompt: Some("be terse".to_string()),
            max_tokens: Some(32),
        })
        .await
        .unwrap();
    assert_eq!(result.model, "test-model");
    assert_matches!(result.content, SamplingContent::Text { ref text } if text == "sampled");
    answerer.await.unwrap();
}

#[tokio::test]
async fn roots_round_trip() {
    setup_test_logging();
    let (client, mut server) = default_pair();
    let mut server_events = server.take_events().unwrap();
    let (client, server) = ready_pair(client, server).await;

    client.add_root(Root::new("file:///workspace").with_name("ws")).await;
    client.add_root(Root::new("file:///scratch")).await;

    let roots = server.list_roots().await.unwrap();
    assert_eq!(roots.roots.len(), 2);

    // Replacing a root by URI keeps the set deduplicated.
    client.add_root(Root::new("file:///scratch").with_name("renamed")).await;
    let roots = server.list_roots().await.unwrap();
    assert_eq!(roots.roots.len(), 2);

    client.notify_roots_changed().await.unwrap();
    loop {
        match server_events.recv().await.unwrap() {
            ServerEvent::RootsListChanged => break,
            _ => continue,
        }
    }

    assert!(client.remove_root("file:///scratch").await);
    assert!(!client.remove_root("file:///scratch").await);
}

#[tokio::test]
async fn list_changed_notifications_reach_client() {
    setup_test_logging();
    let (mut client, server) = default_pair();
    server.register_tool(Tool::new("echo"), |_| Ok(vec![]));

    let mut events = client.take_events().unwrap();
    let (_client, server) = ready_pair(client, server).await;

    server.notify_tools_list_changed().await.unwrap();
    server.notify_prompts_list_changed().await.unwrap();
    server.notify_resources_list_changed().await.unwrap();
    server
        .notify_log(
            mcp_runtime::messages::LogLevel::Info,
            Some("test".to_string()),
            json!("hello"),
        )
        .await
        .unwrap();
    server.notify_progress(json!("tok"), 0.5, Some(1.0)).await.unwrap();

    let mut saw_tools = false;
    let mut saw_prompts = false;
    let mut saw_resources = false;
    let mut saw_log = false;
    let mut saw_progress = false;
    while !(saw_tools && saw_prompts && saw_resources && saw_log && saw_progress) {
        match events.recv().await.unwrap() {
            ClientEvent::ToolListChanged => saw_tools = true,
            ClientEvent::PromptListChanged => saw_prompts = true,
            ClientEvent::ResourceListChanged => saw_resources = true,
            ClientEvent::LogMessage(params) => {
                assert_eq!(params.logger.as_deref(), Some("test"));
                saw_log = true;
            }
            ClientEvent::Progress(params) => {
                assert_eq!(params.progress, 0.5);
                saw_progress = true;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn disconnect_tears_down_cleanly() {
    setup_test_logging();
    let (client, server) = default_pair();
    let (mut client, _server) = ready_pair(client, server).await;

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), SessionState::Disconnected);

    let after = client.ping().await;
    assert_matches!(after, Err(McpError::Protocol(_)));
}
