use std::sync::Arc;

use medchat::chat::{
    APOLOGY_TEXT, CONFIGURATION_ERROR_TEXT, ExchangeController, ExchangeEvents, ExchangeState,
    MessageStatus, Role, SubmitRejection,
};
use medchat::terminal::{TerminalView, message_label};
use medchat_llm::{
    ChatSession, GenerationSettings, ProviderConfig, ScriptedSession, ScriptedTurn,
};

fn scripted(turns: Vec<ScriptedTurn>) -> (Arc<ScriptedSession>, ExchangeController, ExchangeEvents) {
    let session = Arc::new(ScriptedSession::new(turns));
    let shared: Arc<dyn ChatSession> = session.clone();
    let (controller, events) = ExchangeController::bootstrap(move || Ok(shared));
    (session, controller, events)
}

#[tokio::test]
async fn each_submission_appends_user_then_assistant() {
    let (session, mut controller, mut events) = scripted(vec![
        ScriptedTurn::reply(["Hi there."]),
        ScriptedTurn::reply(["How long ", "has it lasted?"]),
    ]);

    controller.submit("  hello  ").unwrap();
    controller.drive_until_idle(&mut events).await;
    controller.submit("my knee hurts").unwrap();
    controller.drive_until_idle(&mut events).await;

    let messages = controller.transcript().messages();
    let roles: Vec<Role> = messages.iter().map(|message| message.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[3].text, "How long has it lasted?");
    assert!(messages.windows(2).all(|pair| pair[0].id < pair[1].id));
    assert_eq!(session.prompts(), vec!["hello", "my knee hurts"]);
}

#[tokio::test]
async fn submission_while_in_flight_changes_nothing() {
    let (session, mut controller, mut events) =
        scripted(vec![ScriptedTurn::reply(["one"]), ScriptedTurn::reply(["two"])]);

    let first = controller.submit("first").unwrap();
    let rejected = controller.submit("second");

    assert!(matches!(
        rejected,
        Err(SubmitRejection::ExchangeInFlight { active }) if active == first
    ));
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(session.prompts(), vec!["first"]);

    controller.drive_until_idle(&mut events).await;
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(session.remaining_turns(), 1);
}

#[tokio::test]
async fn reply_text_is_the_exact_concatenation_of_increments() {
    let increments = ["**Possible", " causes**", ":\n", "- tension", "\n", "- migraine"];
    let (_session, mut controller, mut events) = scripted(vec![ScriptedTurn::reply(increments)]);

    controller.submit("I have a headache").unwrap();
    controller.drive_until_idle(&mut events).await;

    let reply = controller.transcript().last().unwrap();
    assert_eq!(reply.text, increments.concat());
    assert_eq!(reply.status, MessageStatus::Done);
}

#[tokio::test]
async fn empty_reply_is_still_a_valid_answer() {
    let (_session, mut controller, mut events) =
        scripted(vec![ScriptedTurn::reply(Vec::<String>::new())]);

    controller.submit("anything?").unwrap();
    controller.drive_until_idle(&mut events).await;

    let reply = controller.transcript().last().unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text, "");
    assert_eq!(reply.status, MessageStatus::Done);
}

#[tokio::test]
async fn failure_after_partial_reply_shows_apology_and_recovers() {
    let (_session, mut controller, mut events) = scripted(vec![
        ScriptedTurn::failing(["Possible"], "connection reset"),
        ScriptedTurn::reply(["Back online."]),
    ]);

    controller.submit("hello").unwrap();
    controller.drive_until_idle(&mut events).await;

    let reply = controller.transcript().last().unwrap();
    assert_eq!(reply.text, APOLOGY_TEXT);
    assert_eq!(
        reply.status,
        MessageStatus::Failed("connection reset".to_string())
    );
    assert!(!reply.is_streaming());
    assert_eq!(controller.state(), &ExchangeState::Idle);

    controller.submit("are you there?").unwrap();
    controller.drive_until_idle(&mut events).await;

    assert_eq!(controller.transcript().len(), 4);
    assert_eq!(controller.transcript().last().unwrap().text, "Back online.");
}

#[tokio::test]
async fn failure_before_any_increment_shows_apology() {
    let (_session, mut controller, mut events) = scripted(vec![
        ScriptedTurn::failing(Vec::<String>::new(), "quota exceeded"),
        ScriptedTurn::reply(["Retry worked."]),
    ]);

    let exchange = controller.submit("hello").unwrap();
    assert_eq!(controller.state(), &ExchangeState::AwaitingFirstToken(exchange));
    controller.drive_until_idle(&mut events).await;

    let reply = controller.transcript().last().unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text, APOLOGY_TEXT);
    assert_eq!(
        reply.status,
        MessageStatus::Failed("quota exceeded".to_string())
    );
    assert_eq!(controller.state(), &ExchangeState::Idle);

    controller.submit("again").unwrap();
    controller.drive_until_idle(&mut events).await;
    assert_eq!(controller.transcript().last().unwrap().text, "Retry worked.");
}

#[tokio::test]
async fn submission_while_streaming_changes_nothing() {
    let (session, mut controller, mut events) = scripted(vec![
        ScriptedTurn::reply(["Common ", "causes"]),
        ScriptedTurn::reply(["unused"]),
    ]);

    let exchange = controller.submit("I have a headache").unwrap();
    let first = events.recv().await.unwrap();
    controller.handle_event(first);
    assert_eq!(controller.state(), &ExchangeState::Streaming(exchange));

    assert!(matches!(
        controller.submit("second question"),
        Err(SubmitRejection::ExchangeInFlight { active }) if active == exchange
    ));
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(session.prompts(), vec!["I have a headache"]);

    controller.drive_until_idle(&mut events).await;
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(controller.transcript().last().unwrap().text, "Common causes");
}

#[tokio::test]
async fn whitespace_submissions_never_touch_the_transcript() {
    let (session, mut controller, _events) = scripted(vec![ScriptedTurn::reply(["unused"])]);

    for input in ["", " ", "\n\t  "] {
        assert!(matches!(
            controller.submit(input),
            Err(SubmitRejection::EmptyInput)
        ));
    }

    assert!(controller.transcript().is_empty());
    assert!(session.prompts().is_empty());
    assert!(controller.can_submit());
}

#[tokio::test]
async fn missing_credential_disables_the_conversation() {
    let (mut controller, _events) = ExchangeController::bootstrap(|| {
        medchat_llm::open_session(ProviderConfig::new("   ", ""), GenerationSettings::default())
    });

    assert!(!controller.is_ready());
    let messages = controller.transcript().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].text, CONFIGURATION_ERROR_TEXT);

    assert!(matches!(
        controller.submit("I have a headache"),
        Err(SubmitRejection::NotReady)
    ));
    assert_eq!(controller.transcript().len(), 1);
}

#[tokio::test]
async fn terminal_output_follows_the_stream() {
    let (_session, mut controller, mut events) =
        scripted(vec![ScriptedTurn::reply(["Common ", "causes ", "include..."])]);
    let mut view = TerminalView::new();
    let mut out = Vec::new();

    controller.submit("I have a headache").unwrap();
    view.render(controller.transcript(), &mut out).unwrap();
    while controller.state().is_in_flight() {
        let Some(event) = events.recv().await else {
            break;
        };
        controller.handle_event(event);
        view.render(controller.transcript(), &mut out).unwrap();
    }

    let printed = String::from_utf8(out).unwrap();
    let messages = controller.transcript().messages();
    assert_eq!(
        printed,
        format!(
            "{}: I have a headache\nDr. Gemini is typing...\n{}: Common causes include...\n",
            message_label(&messages[0]),
            message_label(&messages[1])
        )
    );
    assert!(message_label(&messages[0]).starts_with("You ("));
    assert!(message_label(&messages[1]).starts_with("Dr. Gemini ("));
}
