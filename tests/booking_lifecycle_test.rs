mod common;

use common::*;
use pocketlesson::{
    domain::{
        BookingFilter, BookingRole, BookingStatus, CheckinCode, DecisionOutcome, NewBooking,
        ReconciliationKind, TransactionStatus,
    },
    error::AppError,
    payments::fixtures,
    repository::{BookingRepository, ReconciliationRepository, TransactionRepository},
    service::ReconcileOutcome,
};

#[tokio::test]
async fn test_create_booking_is_pending_without_payment() -> anyhow::Result<()> {
    let ctx = setup().await?;

    let booking = ctx.pending_booking().await?;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.host_id, ctx.host.id);
    assert_eq!(booking.guest_id, ctx.guest.id);
    assert_eq!(booking.end_time.format("%H:%M").to_string(), "11:00");
    assert!(booking.payment_intent_id.is_none());
    assert!(CheckinCode::parse(&booking.display_code()).is_ok());
    assert_eq!(ctx.gateway.payment_intent_count(), 0);
    assert!(ctx.services.repos.transactions.find_by_booking(booking.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_guest_cannot_book_own_listing() -> anyhow::Result<()> {
    let ctx = setup().await?;

    let result = ctx
        .services
        .booking_service
        .create(ctx.host.id, booking_request(&ctx))
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    let all = ctx
        .services
        .repos
        .bookings
        .list(&BookingFilter {
            viewer: ctx.host.id,
            role: BookingRole::Host,
            status: None,
        })
        .await?;
    assert!(all.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_create_rejects_bad_input() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let service = &ctx.services.booking_service;

    let mut bad_date = booking_request(&ctx);
    bad_date.date = "12/04/2030".to_string();
    assert!(matches!(service.create(ctx.guest.id, bad_date).await, Err(AppError::InvalidInput(_))));

    let mut bad_time = booking_request(&ctx);
    bad_time.start_time = "25:00".to_string();
    assert!(matches!(service.create(ctx.guest.id, bad_time).await, Err(AppError::InvalidInput(_))));

    let mut overnight = booking_request(&ctx);
    overnight.start_time = "23:30".to_string();
    assert!(matches!(service.create(ctx.guest.id, overnight).await, Err(AppError::InvalidInput(_))));

    let mut bad_venue = booking_request(&ctx);
    bad_venue.venue_id = "kyoto-temple".to_string();
    assert!(matches!(service.create(ctx.guest.id, bad_venue).await, Err(AppError::InvalidInput(_))));

    let mut long_note = booking_request(&ctx);
    long_note.note = Some("x".repeat(501));
    assert!(matches!(service.create(ctx.guest.id, long_note).await, Err(AppError::InvalidInput(_))));

    let mut missing = booking_request(&ctx);
    missing.listing_id = uuid::Uuid::new_v4();
    assert!(matches!(service.create(ctx.guest.id, missing).await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_accept_without_verified_account_leaves_booking_pending() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;

    let outcome = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    assert!(matches!(
        outcome,
        DecisionOutcome::PaymentAccountNotReady { ref remediation } if remediation == "/api/host-account/onboarding-link"
    ));

    // An account that exists but has not finished onboarding is not enough either.
    ctx.services.host_account_service.create_account(&ctx.host).await?;
    let outcome = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    assert!(matches!(outcome, DecisionOutcome::PaymentAccountNotReady { .. }));

    assert_eq!(ctx.booking(booking.id).await?.status, BookingStatus::Pending);
    assert!(ctx.services.repos.transactions.find_by_booking(booking.id).await?.is_none());
    assert_eq!(ctx.gateway.payment_intent_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_accept_creates_intent_and_pending_ledger() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;

    let outcome = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    let (booking, transaction) = match outcome {
        DecisionOutcome::Accepted { booking, transaction } => (booking, transaction),
        other => anyhow::bail!("expected acceptance, got {:?}", other),
    };

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_intent_id.as_deref(), Some(transaction.payment_intent_id.as_str()));
    assert_eq!(transaction.gross_amount, 1500);
    assert_eq!(transaction.platform_fee, 225);
    assert_eq!(transaction.host_payout, 1275);
    assert_eq!(transaction.status, TransactionStatus::Pending);

    let request = ctx.gateway.last_payment_intent_request().unwrap();
    assert_eq!(request.destination_account, HOST_ACCOUNT);
    assert_eq!(request.destination_amount, 1275);
    assert_eq!(request.idempotency_key, format!("accept-{}", booking.id));
    Ok(())
}

#[tokio::test]
async fn test_decided_booking_is_not_decided_again() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    assert_eq!(ctx.gateway.payment_intent_count(), 1);
    let requests = ctx.gateway.payment_intent_requests().len();

    let again = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    assert!(matches!(again, DecisionOutcome::AlreadyDecided { current: BookingStatus::Confirmed }));

    let reject = ctx.services.booking_service.reject(booking.id, ctx.host.id).await?;
    assert!(matches!(reject, DecisionOutcome::AlreadyDecided { current: BookingStatus::Confirmed }));

    assert_eq!(ctx.gateway.payment_intent_requests().len(), requests);
    Ok(())
}

#[tokio::test]
async fn test_only_the_host_decides() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;

    let as_guest = ctx.services.booking_service.accept(booking.id, ctx.guest.id).await;
    assert!(matches!(as_guest, Err(AppError::Forbidden)));
    let as_guest = ctx.services.booking_service.reject(booking.id, ctx.guest.id).await;
    assert!(matches!(as_guest, Err(AppError::Forbidden)));

    let missing = ctx.services.booking_service.accept(uuid::Uuid::new_v4(), ctx.host.id).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_reject_cancels_without_ledger() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;

    let outcome = ctx.services.booking_service.reject(booking.id, ctx.host.id).await?;
    let booking = match outcome {
        DecisionOutcome::Rejected { booking } => booking,
        other => anyhow::bail!("expected rejection, got {:?}", other),
    };

    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert!(ctx.services.repos.transactions.find_by_booking(booking.id).await?.is_none());
    assert_eq!(ctx.gateway.payment_intent_count(), 0);

    let again = ctx.services.booking_service.reject(booking.id, ctx.host.id).await?;
    assert!(matches!(again, DecisionOutcome::AlreadyDecided { current: BookingStatus::Cancelled }));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_accepts_have_one_winner() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;
    let service = ctx.services.booking_service.clone();

    let (first, second) = tokio::join!(
        service.accept(booking.id, ctx.host.id),
        service.accept(booking.id, ctx.host.id),
    );
    let outcomes = [first?, second?];

    let accepted = outcomes
        .iter()
        .filter(|o| matches!(o, DecisionOutcome::Accepted { .. }))
        .count();
    let decided = outcomes
        .iter()
        .filter(|o| matches!(o, DecisionOutcome::AlreadyDecided { current: BookingStatus::Confirmed }))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(decided, 1);

    // Both attempts resolved to the same external intent.
    assert_eq!(ctx.gateway.payment_intent_count(), 1);
    let stored = ctx.booking(booking.id).await?;
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(stored.payment_intent_id.as_deref(), Some(ledger.payment_intent_id.as_str()));
    assert!(ctx.gateway.cancelled_intents().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reject_during_accept_cancels_the_new_intent() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;
    let pause = ctx.gateway.pause_payment_intents();

    let service = ctx.services.booking_service.clone();
    let (booking_id, host_id) = (booking.id, ctx.host.id);
    let accept = tokio::spawn(async move { service.accept(booking_id, host_id).await });

    // The intent exists at the gateway but the accept has not written it yet.
    pause.created().await;
    let rejected = ctx.services.booking_service.reject(booking.id, ctx.host.id).await?;
    assert!(matches!(rejected, DecisionOutcome::Rejected { .. }));
    pause.release();

    let outcome = accept.await??;
    assert!(matches!(outcome, DecisionOutcome::AlreadyDecided { current: BookingStatus::Cancelled }));

    let intent = ctx
        .gateway
        .intent_for_key(&format!("accept-{}", booking.id))
        .unwrap();
    assert_eq!(ctx.gateway.cancelled_intents(), vec![intent.id]);

    let stored = ctx.booking(booking.id).await?;
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert!(stored.payment_intent_id.is_none());
    assert!(ctx.services.repos.transactions.find_by_booking(booking.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_confirmed_row_without_intent_is_rejected() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;
    sqlx::query("UPDATE bookings SET status = 'confirmed' WHERE id = ?")
        .bind(booking.id.to_string())
        .execute(&ctx.pool)
        .await?;

    let result = ctx.services.repos.bookings.find_by_id(booking.id).await;
    assert!(matches!(result, Err(AppError::Database(_))));
    Ok(())
}

#[tokio::test]
async fn test_gateway_failure_keeps_booking_pending() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;
    ctx.gateway.fail_payment_intents(true);

    let result = ctx.services.booking_service.accept(booking.id, ctx.host.id).await;

    assert!(matches!(result, Err(AppError::PaymentGateway(_))));
    assert_eq!(ctx.booking(booking.id).await?.status, BookingStatus::Pending);
    assert!(ctx.services.repos.transactions.find_by_booking(booking.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_ledger_write_failure_is_queued_and_repaired_by_webhook() -> anyhow::Result<()> {
    let ctx = setup().await?;
    ctx.verify_host().await?;
    let booking = ctx.pending_booking().await?;

    sqlx::query(
        "CREATE TRIGGER ledger_offline BEFORE INSERT ON transactions BEGIN SELECT RAISE(ABORT, 'ledger offline'); END;",
    )
    .execute(&ctx.pool)
    .await?;

    let result = ctx.services.booking_service.accept(booking.id, ctx.host.id).await;
    assert!(matches!(result, Err(AppError::Internal(_))));

    // The intent exists externally, so the booking stays confirmed.
    let stored = ctx.booking(booking.id).await?;
    assert_eq!(stored.status, BookingStatus::Confirmed);
    let intent = stored.payment_intent_id.clone().unwrap();

    let open = ctx.services.repos.reconciliation.list_open().await?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].kind, ReconciliationKind::LedgerWriteFailed);
    assert_eq!(open[0].payment_intent_id.as_deref(), Some(intent.as_str()));

    sqlx::query("DROP TRIGGER ledger_offline").execute(&ctx.pool).await?;

    let request = ctx.gateway.last_payment_intent_request().unwrap();
    let succeeded = event(
        "evt_repair",
        "payment_intent.succeeded",
        fixtures::payment_intent(&intent, 1500, &request.metadata),
    );
    let outcome = ctx.services.webhook_reconciler.reconcile(&succeeded).await?;
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(ledger.status, TransactionStatus::Completed);
    assert_eq!((ledger.platform_fee, ledger.host_payout), (225, 1275));
    assert!(ctx.services.repos.reconciliation.list_open().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_guest_withdraws_pending_booking() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;

    let cancelled = ctx.services.booking_service.cancel(booking.id, ctx.guest.id).await?;

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(ctx.gateway.refunds().is_empty());
    assert!(ctx.gateway.cancelled_intents().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_unpaid_confirmed_booking_cancels_intent() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    let intent = booking.payment_intent_id.clone().unwrap();

    let cancelled = ctx.services.booking_service.cancel(booking.id, ctx.host.id).await?;

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(ctx.gateway.cancelled_intents(), vec![intent]);
    assert!(ctx.gateway.refunds().is_empty());
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(ledger.status, TransactionStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_cancel_paid_booking_refunds_and_settles_together() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    let intent = booking.payment_intent_id.clone().unwrap();
    ctx.services
        .webhook_reconciler
        .reconcile(&payment_succeeded("evt_paid", &intent, 1500))
        .await?;

    let cancelled = ctx.services.booking_service.cancel(booking.id, ctx.guest.id).await?;

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(ctx.gateway.refunds(), vec![(intent.clone(), None)]);
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(ledger.status, TransactionStatus::Refunded);
    assert_eq!(ledger.refund_amount, Some(1500));
    assert!(ledger.refund_id.is_some());
    Ok(())
}

#[tokio::test]
async fn test_refund_failure_leaves_booking_untouched() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    let intent = booking.payment_intent_id.clone().unwrap();
    ctx.services
        .webhook_reconciler
        .reconcile(&payment_succeeded("evt_paid", &intent, 1500))
        .await?;
    ctx.gateway.fail_refunds(true);

    let result = ctx.services.booking_service.cancel(booking.id, ctx.guest.id).await;

    assert!(matches!(result, Err(AppError::PaymentGateway(_))));
    assert_eq!(ctx.booking(booking.id).await?.status, BookingStatus::Confirmed);
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(ledger.status, TransactionStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_cancel_is_refused_once_session_started() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    ctx.services.checkin_service.start_session_on(booking.id, ctx.host.id, session_date()).await?;

    let result = ctx.services.booking_service.cancel(booking.id, ctx.guest.id).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(ctx.gateway.refunds().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bookings_are_visible_only_to_participants() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;
    let stranger = create_user(&ctx.services, "stranger@example.com", "Stranger").await?;

    assert!(ctx.services.booking_service.get(booking.id, ctx.host.id).await.is_ok());
    assert!(matches!(
        ctx.services.booking_service.get(booking.id, stranger.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.services.booking_service.cancel(booking.id, stranger.id).await,
        Err(AppError::Forbidden)
    ));
    Ok(())
}

#[tokio::test]
async fn test_list_is_scoped_by_role_and_status() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let first = ctx.pending_booking().await?;
    let second = ctx.pending_booking().await?;
    ctx.services.booking_service.reject(second.id, ctx.host.id).await?;

    let service = &ctx.services.booking_service;
    let as_guest = service
        .list(BookingFilter { viewer: ctx.guest.id, role: BookingRole::Guest, status: None })
        .await?;
    assert_eq!(as_guest.len(), 2);

    let guest_as_host = service
        .list(BookingFilter { viewer: ctx.guest.id, role: BookingRole::Host, status: None })
        .await?;
    assert!(guest_as_host.is_empty());

    let pending_for_host = service
        .list(BookingFilter {
            viewer: ctx.host.id,
            role: BookingRole::Host,
            status: Some(BookingStatus::Pending),
        })
        .await?;
    assert_eq!(pending_for_host.len(), 1);
    assert_eq!(pending_for_host[0].id, first.id);
    Ok(())
}

#[tokio::test]
async fn test_payment_details_for_guest_until_paid() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    let intent = booking.payment_intent_id.clone().unwrap();

    let details = ctx.services.booking_service.payment_details(booking.id, ctx.guest.id).await?;
    assert_eq!(details.payment_intent_id, intent);
    assert_eq!(details.amount, 1500);
    assert_eq!(details.client_secret, format!("{}_secret_fake", intent));

    assert!(matches!(
        ctx.services.booking_service.payment_details(booking.id, ctx.host.id).await,
        Err(AppError::Forbidden)
    ));

    ctx.services
        .webhook_reconciler
        .reconcile(&payment_succeeded("evt_paid", &intent, 1500))
        .await?;
    assert!(matches!(
        ctx.services.booking_service.payment_details(booking.id, ctx.guest.id).await,
        Err(AppError::Conflict(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_checkin_qr_only_for_confirmed_booking() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let pending = ctx.pending_booking().await?;
    assert!(matches!(
        ctx.services.booking_service.checkin_qr(pending.id, ctx.guest.id).await,
        Err(AppError::Conflict(_))
    ));

    let booking = ctx.confirmed_booking().await?;
    let svg = ctx.services.booking_service.checkin_qr(booking.id, ctx.guest.id).await?;
    assert!(svg.contains("<svg"));
    Ok(())
}

#[tokio::test]
async fn test_verified_host_scenario_end_to_end() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.confirmed_booking().await?;
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!((ledger.platform_fee, ledger.host_payout), (225, 1275));

    let intent = booking.payment_intent_id.clone().unwrap();
    ctx.services
        .webhook_reconciler
        .reconcile(&payment_succeeded("evt_e2e", &intent, 1500))
        .await?;
    let ledger = ctx.services.repos.transactions.find_by_booking(booking.id).await?.unwrap();
    assert_eq!(ledger.status, TransactionStatus::Completed);

    let summary = ctx
        .services
        .checkin_service
        .verify_on(&booking.display_code(), ctx.host.id, session_date())
        .await?;
    assert_eq!(summary.booking_id, booking.id);

    let started = ctx.services.checkin_service.start_session_on(booking.id, ctx.host.id, session_date()).await?;
    assert_eq!(started.status, BookingStatus::InProgress);
    Ok(())
}

#[tokio::test]
async fn test_host_onboarding_unblocks_accept() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let booking = ctx.pending_booking().await?;

    let account = ctx.services.host_account_service.create_account(&ctx.host).await?;
    let outcome = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    assert!(matches!(outcome, DecisionOutcome::PaymentAccountNotReady { .. }));

    let link = ctx.services.host_account_service.onboarding_link(ctx.host.id).await?;
    assert!(link.contains(&account.stripe_account_id));

    let update = account_updated("evt_onboarded", &account.stripe_account_id, true, true);
    assert_eq!(
        ctx.services.webhook_reconciler.reconcile(&update).await?,
        ReconcileOutcome::Applied
    );

    let outcome = ctx.services.booking_service.accept(booking.id, ctx.host.id).await?;
    match outcome {
        DecisionOutcome::Accepted { booking, .. } => {
            assert_eq!(booking.status, BookingStatus::Confirmed)
        }
        other => anyhow::bail!("expected acceptance, got {:?}", other),
    }
    let request = ctx.gateway.last_payment_intent_request().unwrap();
    assert_eq!(request.destination_account, account.stripe_account_id);
    Ok(())
}

#[tokio::test]
async fn test_checkin_code_collision_retries_with_new_code() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let first = ctx.pending_booking().await?;

    // Same host, date and code as an existing booking: nothing is written.
    let duplicate = NewBooking {
        id: uuid::Uuid::new_v4(),
        listing_id: first.listing_id,
        guest_id: first.guest_id,
        host_id: first.host_id,
        date: first.date,
        start_time: first.start_time,
        end_time: first.end_time,
        venue_id: first.venue_id.clone(),
        note: None,
        checkin_code: first.checkin_code.clone(),
    };
    assert!(ctx.services.repos.bookings.create(duplicate).await?.is_none());

    // The next insert is swallowed as a collision once; create draws again.
    sqlx::query("CREATE TABLE collided (n INTEGER)").execute(&ctx.pool).await?;
    sqlx::query(
        r#"
        CREATE TRIGGER collide_once BEFORE INSERT ON bookings
        WHEN (SELECT COUNT(*) FROM collided) = 0
        BEGIN
            INSERT INTO collided VALUES (1);
            SELECT RAISE(IGNORE);
        END
        "#,
    )
    .execute(&ctx.pool)
    .await?;

    let second = ctx.pending_booking().await?;
    let collisions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collided")
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(collisions, 1);
    assert_eq!(second.status, BookingStatus::Pending);
    assert_ne!(second.checkin_code, first.checkin_code);
    Ok(())
}
