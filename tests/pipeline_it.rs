mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// self
use common::*;
use oauth2_pipeline::{
	clock::{ManualClock, SystemClock},
	error::{AcquisitionError, Error},
	http::{ApiRequest, Method},
	retry::{AttemptOutcome, BackoffPolicy},
};

const CAMPAIGNS: &str = "/api/v5/campaigns";

#[tokio::test]
async fn unauthorized_once_refreshes_and_resends() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(config_builder(), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(401), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("Recovered call should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.token_requests(), 2);
	assert_eq!(transport.bearers_sent_to(CAMPAIGNS), vec!["Bearer token-1", "Bearer token-2"]);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn second_unauthorized_is_returned_without_a_third_send() {
	let transport = ScriptedTransport::new();
	let client = client(config_builder(), &transport, Arc::new(ManualClock::default()));

	transport.script(CAMPAIGNS, [Reply::Status(401), Reply::Status(401)]);

	let response = client.get(CAMPAIGNS).await.expect("A repeated 401 is a response.");

	assert_eq!(response.status_code(), 401);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 2);
	assert_eq!(transport.token_requests(), 2);
}

#[tokio::test]
async fn failed_refresh_during_recovery_returns_the_original_unauthorized() {
	let transport = ScriptedTransport::new();
	let client = client(config_builder(), &transport, Arc::new(ManualClock::default()));

	transport.script_tokens([TokenReply::Issue, TokenReply::Reject(400, "invalid_client")]);
	transport.script(CAMPAIGNS, [Reply::Status(401)]);

	let response = client.get(CAMPAIGNS).await.expect("The 401 should not be masked.");

	assert_eq!(response.status_code(), 401);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 1);
	assert_eq!(transport.token_requests(), 2);
}

#[tokio::test]
async fn server_errors_retry_until_success() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client =
		client(config_builder().backoff(backoff(3)), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(500), Reply::Status(500), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("Third attempt should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 3);
	assert_eq!(clock.sleeps(), secs(&[2, 4]));
}

#[tokio::test]
async fn exhausted_attempts_return_the_last_response() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client =
		client(config_builder().backoff(backoff(3)), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(500), Reply::Status(502), Reply::Status(503)]);

	let response = client.get(CAMPAIGNS).await.expect("Exhaustion returns the last response.");

	assert_eq!(response.status_code(), 503);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 3);
	assert_eq!(
		response.error_for_status().expect_err("503 should convert into an error.").status(),
		Some(503)
	);
}

#[tokio::test]
async fn default_policy_sends_five_times_on_the_doubling_curve() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(config_builder(), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, (0..8).map(|_| Reply::Status(503)));

	let response = client.get(CAMPAIGNS).await.expect("Exhaustion returns the last response.");

	assert_eq!(response.status_code(), 503);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 5);
	assert_eq!(clock.sleeps(), secs(&[2, 4, 8, 16]));
}

#[tokio::test]
async fn unbounded_policy_caps_the_delay() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let policy = BackoffPolicy::on_retryable_error().with_max_attempts(None);
	let client = client(config_builder().backoff(policy), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, (0..6).map(|_| Reply::Status(500)));

	let response = client.get(CAMPAIGNS).await.expect("The seventh attempt should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 7);
	assert_eq!(clock.sleeps(), secs(&[2, 4, 8, 16, 16, 16]));
}

#[tokio::test]
async fn none_policy_returns_the_first_server_error() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(
		config_builder().backoff(BackoffPolicy::none()),
		&transport,
		Arc::new(clock.clone()),
	);

	transport.script(CAMPAIGNS, [Reply::Status(500), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("The 500 is returned as a response.");

	assert_eq!(response.status_code(), 500);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 1);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn none_policy_still_recovers_from_unauthorized() {
	let transport = ScriptedTransport::new();
	let client = client(
		config_builder().backoff(BackoffPolicy::none()),
		&transport,
		Arc::new(ManualClock::default()),
	);

	transport.script(CAMPAIGNS, [Reply::Status(401), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("Recovery is independent of backoff.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.token_requests(), 2);
}

#[tokio::test]
async fn recovery_and_backoff_keep_separate_budgets() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client =
		client(config_builder().backoff(backoff(2)), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(401), Reply::Status(500), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("Recovered call should then back off.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 3);
	assert_eq!(transport.token_requests(), 2);
	assert_eq!(clock.sleeps(), secs(&[2]));
}

#[tokio::test]
async fn recovery_still_applies_after_a_backoff_retry() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client =
		client(config_builder().backoff(backoff(3)), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(500), Reply::Status(401), Reply::Status(200)]);

	let response = client.get(CAMPAIGNS).await.expect("Backoff then recovery should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(
		transport.bearers_sent_to(CAMPAIGNS),
		vec!["Bearer token-1", "Bearer token-1", "Bearer token-2"]
	);
	assert_eq!(transport.token_requests(), 2);
	assert_eq!(clock.sleeps(), secs(&[2]));
}

#[tokio::test]
async fn transport_failures_are_retried_and_the_last_error_surfaces() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client =
		client(config_builder().backoff(backoff(2)), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Fail, Reply::Fail]);

	let err = client.get(CAMPAIGNS).await.expect_err("Both attempts fail at the transport.");

	assert!(matches!(err, Error::Transport(_)));
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 2);
	assert_eq!(clock.sleeps(), secs(&[2]));
}

#[tokio::test]
async fn non_retryable_responses_are_returned_verbatim() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(config_builder(), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(404)]);

	let response = client.get(CAMPAIGNS).await.expect("A 404 is a response.");

	assert_eq!(response.status_code(), 404);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 1);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn retry_after_raises_the_delay() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(config_builder(), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::RetryAfter(429, "9")]);

	let response = client.get(CAMPAIGNS).await.expect("Second attempt should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(clock.sleeps(), secs(&[9]));
}

#[tokio::test]
async fn hinted_wait_is_carried_into_later_delays() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(config_builder(), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::RetryAfter(429, "10"), Reply::Status(500)]);

	let response = client.get(CAMPAIGNS).await.expect("Third attempt should succeed.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 3);
	assert_eq!(clock.sleeps(), secs(&[10, 10]));
}

#[tokio::test]
async fn custom_predicate_overrides_classification() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let policy = backoff(3).with_predicate(|outcome| {
		matches!(outcome, AttemptOutcome::Response(response) if response.status_code() == 409)
	});
	let client = client(config_builder().backoff(policy), &transport, Arc::new(clock.clone()));

	transport.script(CAMPAIGNS, [Reply::Status(409), Reply::Status(500)]);

	let response = client.get(CAMPAIGNS).await.expect("The 500 is returned as a response.");

	assert_eq!(response.status_code(), 500);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 2);
}

#[tokio::test]
async fn credential_failures_abort_before_sending() {
	let transport = ScriptedTransport::new();
	let client = client(config_builder(), &transport, Arc::new(ManualClock::default()));

	transport.script_tokens([TokenReply::Reject(400, "invalid_client")]);

	let err = client.get(CAMPAIGNS).await.expect_err("Injector failures abort the call.");

	assert_eq!(err.status(), Some(400));
	let Error::CredentialAcquisition(inner) = err else {
		panic!("Credential failures should surface as acquisition errors.");
	};

	assert!(matches!(*inner, AcquisitionError::Rejected { .. }));
	assert!(transport.sent_to(CAMPAIGNS).is_empty());
}

#[tokio::test]
async fn requests_are_decorated_in_order() {
	let transport = ScriptedTransport::new();
	let client = client(config_builder(), &transport, Arc::new(ManualClock::default()));
	let template = ApiRequest::new(
		Method::POST,
		"http://localhost:9000/api/v5/campaigns/find".parse().expect("Template URL."),
	)
	.with_body(r#"{"pagination":{"offset":0,"limit":20}}"#);

	client.execute(&template).await.expect("Decorated request should succeed.");

	let sent = transport.sent_to("/api/v5/campaigns/find");
	let request = sent.first().expect("One request should have been sent.");

	assert_eq!(request.url.as_str(), "https://api.example.test/api/v5/campaigns/find");
	assert_eq!(request.method, Method::POST);
	assert_eq!(request.header("accept"), Some("application/json"));
	assert_eq!(request.header("authorization"), Some("Bearer token-1"));
	assert_eq!(request.body, template.body);
}

#[tokio::test]
async fn deadline_bounds_the_backoff_schedule() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::default();
	let client = client(
		config_builder().timeout(StdDuration::from_secs(10)),
		&transport,
		Arc::new(clock.clone()),
	);

	transport.script(CAMPAIGNS, (0..5).map(|_| Reply::Status(500)));

	let err = client.get(CAMPAIGNS).await.expect_err("The 8s delay would cross the deadline.");

	assert!(matches!(err, Error::Timeout { deadline } if deadline == StdDuration::from_secs(10)));
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 3);
	assert_eq!(clock.sleeps(), secs(&[2, 4]));
}

#[tokio::test]
async fn deadline_aborts_a_hanging_send() {
	let transport = ScriptedTransport::new();
	let client = client(
		config_builder().timeout(StdDuration::from_millis(100)),
		&transport,
		Arc::new(SystemClock),
	);

	transport.script(CAMPAIGNS, [Reply::Hang]);

	let err = client.get(CAMPAIGNS).await.expect_err("A hanging send must time out.");

	assert!(matches!(err, Error::Timeout { .. }));
	assert_eq!(err.status(), None);
}

#[tokio::test]
async fn cancelling_one_call_leaves_others_untouched() {
	const FLAKY: &str = "/api/v5/reports";

	let delay = StdDuration::from_millis(300);
	let policy = BackoffPolicy::on_retryable_error().with_delays(delay, delay);
	let transport = ScriptedTransport::new();
	let client =
		Arc::new(client(config_builder().backoff(policy), &transport, Arc::new(SystemClock)));
	let spawn_get = |path: &'static str| {
		let client = client.clone();

		tokio::spawn(async move { client.get(path).await })
	};

	transport.script(FLAKY, (0..5).map(|_| Reply::Status(503)));
	transport.script(CAMPAIGNS, [Reply::Status(503), Reply::Status(200)]);

	let cancelled = spawn_get(FLAKY);
	let independent = spawn_get(CAMPAIGNS);

	for _ in 0..200 {
		if !transport.sent_to(FLAKY).is_empty() && !transport.sent_to(CAMPAIGNS).is_empty() {
			break;
		}

		tokio::time::sleep(StdDuration::from_millis(5)).await;
	}

	assert_eq!(transport.sent_to(FLAKY).len(), 1);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 1);

	cancelled.abort();

	assert!(cancelled.await.expect_err("The call was aborted.").is_cancelled());

	let response = independent
		.await
		.expect("Independent task should not panic.")
		.expect("Independent call should complete.");

	assert_eq!(response.status_code(), 200);
	assert_eq!(transport.sent_to(CAMPAIGNS).len(), 2);

	tokio::time::sleep(StdDuration::from_millis(400)).await;

	assert_eq!(transport.sent_to(FLAKY).len(), 1);
	assert_eq!(transport.token_requests(), 1);
}
