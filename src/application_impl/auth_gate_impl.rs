use super::session_rotation::{RotationPolicy, SessionRotator};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::IdentityStore;
use crate::logger::*;
use std::sync::Arc;

/// Per-request admission control.
///
/// In [`GateMode::Rotating`] a request walks at most three steps and stops at
/// the first terminal outcome:
///
/// 1. both tokens must be present;
/// 2. a valid access token admits the request as is, as long as its
///    identity still holds a live session;
/// 3. otherwise the refresh token must verify and match the identity's
///    current session, in which case a new pair is minted, persisted with
///    compare-and-swap and handed back in [`Admission::rotated`].
///
/// [`GateMode::AccessOnly`] stops after step 2 and never rotates.
pub struct RealAuthGate {
    token_codec: Arc<dyn TokenCodec>,
    identity_store: Arc<dyn IdentityStore>,
    rotator: SessionRotator,
}

impl RealAuthGate {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        identity_store: Arc<dyn IdentityStore>,
        policy: RotationPolicy,
    ) -> Self {
        let rotator = SessionRotator::new(token_codec.clone(), identity_store.clone(), policy);
        RealAuthGate {
            token_codec,
            identity_store,
            rotator,
        }
    }

    async fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, AuthError> {
        let claims = self.token_codec.verify(token).await?;
        if claims.kind != kind {
            debug!(expected = %kind, found = %claims.kind, "token of the wrong kind");
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }

    async fn accept_access(&self, claims: TokenClaims) -> Result<Admission, AuthError> {
        let identity = self.identity_store.get_by_id(claims.subject).await?;
        match identity {
            Some(identity) if identity.is_session_valid => {
                trace!(user_id = %identity.id, "admitted on access token");
                Ok(Admission {
                    identity: identity.into(),
                    rotated: None,
                })
            }
            Some(_) => {
                warn!(user_id = %claims.subject, "access token for a closed session");
                Err(AuthError::SessionInvalidated)
            }
            None => {
                warn!(user_id = %claims.subject, "access token for an unknown identity");
                Err(AuthError::SessionInvalidated)
            }
        }
    }

    async fn try_refresh(&self, refresh_token: &str) -> Result<Admission, AuthError> {
        let claims = self
            .verify_kind(refresh_token, TokenKind::Refresh)
            .await
            .inspect_err(|e| warn!(reason = %e, "refresh token rejected"))?;

        let Some(identity) = self.identity_store.get_by_id(claims.subject).await? else {
            warn!(user_id = %claims.subject, "refresh token for an unknown identity");
            return Err(AuthError::SessionInvalidated);
        };

        let tokens = self.rotator.rotate(&identity, refresh_token).await?;

        info!(user_id = %identity.id, "admitted after token rotation");
        Ok(Admission {
            identity: identity.into(),
            rotated: Some(tokens),
        })
    }
}

#[async_trait::async_trait]
impl AuthGate for RealAuthGate {
    async fn admit(
        &self,
        presented: PresentedTokens,
        mode: GateMode,
    ) -> Result<Admission, AuthError> {
        match mode {
            GateMode::AccessOnly => {
                let Some(access_token) = presented.access_token else {
                    debug!("rejected: no access token");
                    return Err(AuthError::MissingTokens);
                };
                let claims = self.verify_kind(&access_token, TokenKind::Access).await?;
                self.accept_access(claims).await
            }
            GateMode::Rotating => {
                let (Some(access_token), Some(refresh_token)) =
                    (presented.access_token, presented.refresh_token)
                else {
                    debug!("rejected: missing tokens");
                    return Err(AuthError::MissingTokens);
                };

                match self.verify_kind(&access_token, TokenKind::Access).await {
                    Ok(claims) => return self.accept_access(claims).await,
                    Err(e) if e.is_token_failure() => {
                        debug!(reason = %e, "access token not usable, trying refresh token");
                    }
                    Err(e) => return Err(e),
                }

                self.try_refresh(&refresh_token).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtConfig, JwtHs256Codec};
    use crate::domain_port::MockIdentityStore;
    use crate::infra_memory::MemoryIdentityStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryIdentityStore>,
        codec: Arc<JwtHs256Codec>,
        user_id: UserId,
    }

    fn codec() -> Arc<JwtHs256Codec> {
        Arc::new(
            JwtHs256Codec::try_new(JwtConfig {
                issuer: "tollgate.test".to_string(),
                audience: "tollgate-client".to_string(),
                access_ttl: Duration::from_secs(300),
                refresh_ttl: Duration::from_secs(86_400),
                signing_key: b"test-secret".to_vec(),
            })
            .unwrap(),
        )
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryIdentityStore::new());
            let user_id = UserId::new_random();
            store.insert(Identity::new(user_id, "a@test.com", "digest"));
            Fixture {
                store,
                codec: codec(),
                user_id,
            }
        }

        fn gate(&self, policy: RotationPolicy) -> RealAuthGate {
            RealAuthGate::new(self.codec.clone(), self.store.clone(), policy)
        }

        /// Open a session the way login does, with an access token issued `age` ago.
        async fn open_session(&self, age: ChronoDuration) -> (String, String) {
            let issued_at = Utc::now() - age;
            let access = self
                .codec
                .issue_at(self.user_id, TokenKind::Access, issued_at)
                .unwrap();
            let refresh = self
                .codec
                .issue_at(self.user_id, TokenKind::Refresh, issued_at)
                .unwrap();
            self.store
                .update_refresh_token(self.user_id, &refresh.token)
                .await
                .unwrap();
            (access.token, refresh.token)
        }

        async fn current_refresh_token(&self) -> Option<String> {
            self.store
                .get_by_id(self.user_id)
                .await
                .unwrap()
                .unwrap()
                .current_refresh_token
        }
    }

    fn presented(access: &str, refresh: &str) -> PresentedTokens {
        PresentedTokens::new(Some(access.to_string()), Some(refresh.to_string()))
    }

    fn expired() -> ChronoDuration {
        ChronoDuration::minutes(30)
    }

    #[tokio::test]
    async fn fresh_access_token_is_admitted_without_side_effects() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (access, refresh) = f.open_session(ChronoDuration::zero()).await;

        for _ in 0..2 {
            let admission = gate
                .admit(presented(&access, &refresh), GateMode::Rotating)
                .await
                .unwrap();
            assert_eq!(admission.identity.id, f.user_id);
            assert!(admission.rotated.is_none());
        }
        assert_eq!(f.current_refresh_token().await.as_deref(), Some(refresh.as_str()));
    }

    #[tokio::test]
    async fn expired_access_token_rotates_once() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (access, refresh) = f.open_session(expired()).await;
        let old_access = f.codec.decode(&access).await.unwrap();

        let admission = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap();

        assert_eq!(admission.identity.id, f.user_id);
        let rotated = admission.rotated.expect("tokens should rotate");
        assert!(rotated.access_token_expires_at > old_access.expires_at);
        assert_ne!(rotated.refresh_token.0, refresh);
        assert_eq!(
            f.current_refresh_token().await.as_deref(),
            Some(rotated.refresh_token.0.as_str())
        );

        let new_access = f.codec.verify(&rotated.access_token.0).await.unwrap();
        assert_eq!(new_access.subject, f.user_id);
        assert_eq!(new_access.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn old_refresh_token_is_dead_after_rotation() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (access, refresh) = f.open_session(expired()).await;

        gate.admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap();

        let err = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));

        // reuse of a retired token revokes the whole session
        let identity = f.store.get_by_id(f.user_id).await.unwrap().unwrap();
        assert!(!identity.is_session_valid);
        assert!(identity.current_refresh_token.is_none());
    }

    #[tokio::test]
    async fn reuse_without_revocation_keeps_the_session() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy {
            revoke_on_reuse: false,
        });
        let (access, refresh) = f.open_session(expired()).await;

        let rotated = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap()
            .rotated
            .unwrap();
        let err = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));
        assert_eq!(
            f.current_refresh_token().await.as_deref(),
            Some(rotated.refresh_token.0.as_str())
        );
    }

    #[tokio::test]
    async fn signed_but_unissued_refresh_token_is_rejected() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (access, _refresh) = f.open_session(expired()).await;
        let stray = f
            .codec
            .generate(f.user_id, TokenKind::Refresh)
            .await
            .unwrap();

        let err = gate
            .admit(presented(&access, &stray.token), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));
    }

    #[tokio::test]
    async fn missing_tokens_are_rejected_before_parsing() {
        // mocks without expectations panic if touched
        let gate = RealAuthGate::new(
            Arc::new(MockTokenCodec::new()),
            Arc::new(MockIdentityStore::new()),
            RotationPolicy::default(),
        );

        let cases = [
            PresentedTokens::new(None, None),
            PresentedTokens::new(Some("a".to_string()), None),
            PresentedTokens::new(None, Some("r".to_string())),
            PresentedTokens::new(Some("  ".to_string()), Some("r".to_string())),
        ];
        for case in cases {
            let err = gate.admit(case, GateMode::Rotating).await.unwrap_err();
            assert!(matches!(err, AuthError::MissingTokens));
        }

        let err = gate
            .admit(PresentedTokens::default(), GateMode::AccessOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingTokens));
    }

    #[tokio::test]
    async fn closed_session_rejects_both_paths() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (fresh_access, refresh) = f.open_session(ChronoDuration::zero()).await;
        let stale_access = f
            .codec
            .issue_at(f.user_id, TokenKind::Access, Utc::now() - expired())
            .unwrap()
            .token;

        f.store.invalidate_session(f.user_id).await.unwrap();

        let err = gate
            .admit(presented(&fresh_access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));

        let err = gate
            .admit(presented(&stale_access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));
    }

    #[tokio::test]
    async fn invalid_refresh_token_is_terminal() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (access, _refresh) = f.open_session(expired()).await;

        let err = gate
            .admit(presented(&access, "garbage"), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));

        // an access token cannot stand in for a refresh token
        let err = gate
            .admit(presented(&access, &access), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn refresh_token_cannot_be_used_as_access_token() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());
        let (_access, refresh) = f.open_session(ChronoDuration::zero()).await;

        let err = gate
            .admit(
                PresentedTokens::new(Some(refresh.clone()), None),
                GateMode::AccessOnly,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn access_only_mode_never_rotates() {
        let f = Fixture::new();
        let gate = f.gate(RotationPolicy::default());

        let (access, refresh) = f.open_session(ChronoDuration::zero()).await;
        let admission = gate
            .admit(presented(&access, &refresh), GateMode::AccessOnly)
            .await
            .unwrap();
        assert_eq!(admission.identity.id, f.user_id);
        assert!(admission.rotated.is_none());

        let (access, refresh) = f.open_session(expired()).await;
        let err = gate
            .admit(presented(&access, &refresh), GateMode::AccessOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        assert_eq!(f.current_refresh_token().await.as_deref(), Some(refresh.as_str()));
    }

    #[tokio::test]
    async fn blocked_identity_cannot_rotate() {
        let f = Fixture::new();
        let (access, refresh) = f.open_session(expired()).await;
        let mut identity = f.store.get_by_id(f.user_id).await.unwrap().unwrap();
        identity.is_blocked = true;
        f.store.insert(identity);

        let err = f
            .gate(RotationPolicy::default())
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
    }

    fn mocked_gate(
        rotate_result: impl Fn() -> Result<bool, AuthError> + Send + 'static,
    ) -> (RealAuthGate, String, String) {
        let codec = codec();
        let user_id = UserId::new_random();
        let access = codec
            .issue_at(user_id, TokenKind::Access, Utc::now() - expired())
            .unwrap()
            .token;
        let refresh = codec
            .issue_at(user_id, TokenKind::Refresh, Utc::now())
            .unwrap()
            .token;

        let mut identity = Identity::new(user_id, "a@test.com", "digest");
        identity.is_session_valid = true;
        identity.current_refresh_token = Some(refresh.clone());

        let mut store = MockIdentityStore::new();
        store
            .expect_get_by_id()
            .returning(move |_| Ok(Some(identity.clone())));
        store
            .expect_rotate_refresh_token()
            .times(1)
            .returning(move |_, _, _| rotate_result());

        let gate = RealAuthGate::new(codec, Arc::new(store), RotationPolicy::default());
        (gate, access, refresh)
    }

    #[tokio::test]
    async fn failed_rotation_write_is_internal() {
        let (gate, access, refresh) =
            mocked_gate(|| Err(AuthError::Store("connection reset".to_string())));

        let err = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InternalError(_)), "{err:?}");
    }

    #[tokio::test]
    async fn lost_rotation_race_is_session_invalidated() {
        let (gate, access, refresh) = mocked_gate(|| Ok(false));

        let err = gate
            .admit(presented(&access, &refresh), GateMode::Rotating)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalidated));
    }

    #[tokio::test]
    async fn concurrent_rotations_admit_exactly_one() {
        let f = Fixture::new();
        let gate = Arc::new(f.gate(RotationPolicy {
            revoke_on_reuse: false,
        }));
        let (access, refresh) = f.open_session(expired()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let tokens = presented(&access, &refresh);
            handles.push(tokio::spawn(async move {
                gate.admit(tokens, GateMode::Rotating).await
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(admission) => admitted.push(admission),
                Err(e) => assert!(matches!(e, AuthError::SessionInvalidated), "{e:?}"),
            }
        }
        assert_eq!(admitted.len(), 1);
        let winner = admitted[0].rotated.as_ref().unwrap();
        assert_eq!(
            f.current_refresh_token().await.as_deref(),
            Some(winner.refresh_token.0.as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rotation_write_outlives_a_dropped_request() {
        let written = Arc::new(AtomicBool::new(false));
        let flag = written.clone();
        let (gate, access, refresh) = mocked_gate(move || {
            std::thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
            Ok(true)
        });

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            gate.admit(presented(&access, &refresh), GateMode::Rotating),
        )
        .await;
        assert!(outcome.is_err(), "request should have been dropped mid-write");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(written.load(Ordering::SeqCst));
    }
}
