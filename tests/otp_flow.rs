use otp_auth::{
    otp::{MemoryCache, OtpConfig, OtpError, OtpService, RecordingSink},
    session::{IdentityStore, JwtIssuer, MemoryIdentityStore, SessionIssuer},
};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

const PHONE: &str = "+14155550100";

struct Flow {
    service: OtpService,
    sink: Arc<RecordingSink>,
    identities: Arc<MemoryIdentityStore>,
    tokens: Arc<JwtIssuer>,
}

fn flow(config: OtpConfig) -> Flow {
    let tokens = Arc::new(JwtIssuer::new(
        &SecretString::from("integration-secret".to_string()),
        "otp-auth",
    ));
    let sink = Arc::new(RecordingSink::new());
    let identities = Arc::new(MemoryIdentityStore::new());
    let service = OtpService::new(
        config,
        Arc::new(MemoryCache::new()),
        identities.clone(),
        SessionIssuer::new(tokens.clone(), Duration::from_secs(86_400)),
        sink.clone(),
    );
    Flow {
        service,
        sink,
        identities,
        tokens,
    }
}

#[tokio::test]
async fn first_login_registers_the_phone_number() -> Result<(), Box<dyn std::error::Error>> {
    let flow = flow(OtpConfig::default());
    assert_eq!(flow.identities.find_by_phone(PHONE).await?, None);

    let issued = flow.service.send_otp(PHONE).await?;
    assert_eq!(issued.phone_number, PHONE);
    let code = flow.sink.last_code(PHONE).ok_or("no code delivered")?;
    assert_eq!(code.len(), 6);

    let session = flow.service.verify_otp(PHONE, &code).await?;
    let claims = flow.tokens.verify(&session.token)?;
    assert_eq!(claims.phone_number, PHONE);
    assert_eq!(claims.user_id, session.identity.id);
    assert_eq!(
        flow.identities.find_by_phone(PHONE).await?,
        Some(session.identity.clone())
    );

    // The challenge is single use.
    assert!(matches!(
        flow.service.verify_otp(PHONE, &code).await,
        Err(OtpError::OtpExpired)
    ));
    Ok(())
}

#[tokio::test]
async fn three_wrong_codes_discard_the_challenge() -> Result<(), Box<dyn std::error::Error>> {
    let flow = flow(OtpConfig::default());
    flow.service.send_otp(PHONE).await?;
    let code = flow.sink.last_code(PHONE).ok_or("no code delivered")?;
    let wrong: String = code
        .bytes()
        .map(|b| char::from(b'0' + (b - b'0' + 5) % 10))
        .collect();

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(flow.service.verify_otp(PHONE, &wrong).await.err());
    }
    assert!(matches!(outcomes[0], Some(OtpError::InvalidOtp)));
    assert!(matches!(outcomes[1], Some(OtpError::InvalidOtp)));
    assert!(matches!(outcomes[2], Some(OtpError::TooManyAttempts)));
    assert!(matches!(outcomes[3], Some(OtpError::OtpExpired)));

    // A new code can be requested and used afterwards.
    flow.service.send_otp(PHONE).await?;
    let fresh = flow.sink.last_code(PHONE).ok_or("no code delivered")?;
    flow.service.verify_otp(PHONE, &fresh).await?;
    Ok(())
}

#[tokio::test]
async fn fourth_request_in_a_window_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let flow = flow(OtpConfig::default());
    for _ in 0..3 {
        flow.service.send_otp(PHONE).await?;
    }
    assert!(matches!(
        flow.service.send_otp(PHONE).await,
        Err(OtpError::RateLimitExceeded)
    ));
    assert_eq!(flow.sink.delivered(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_input_never_reaches_the_store() {
    let flow = flow(OtpConfig::default());
    assert!(matches!(
        flow.service.send_otp("+1 415 555 0100").await,
        Err(OtpError::InvalidPhoneNumber)
    ));
    assert!(matches!(
        flow.service.verify_otp(PHONE, "abcdef").await,
        Err(OtpError::InvalidOtp)
    ));
    assert_eq!(flow.sink.delivered(), 0);
}
