use crate::{
    api::{attendance, enrollment, kiosk, scan},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Kiosk routes: authenticated by the device identifier token inside the
    // payload, not by a bearer token
    cfg.service(
        web::scope("/kiosk")
            .service(
                web::resource("/check-in")
                    .wrap(scan_limiter.clone())
                    .route(web::post().to(scan::check_in)),
            )
            .service(
                web::resource("/check-out")
                    .wrap(scan_limiter.clone())
                    .route(web::post().to(scan::check_out)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    // /attendance/compute
                    .service(
                        web::resource("/compute")
                            .route(web::post().to(attendance::compute_attendance)),
                    )
                    // /attendance/history
                    .service(
                        web::resource("/history").route(web::get().to(attendance::list_history)),
                    )
                    // /attendance/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_attendance))
                            .route(web::delete().to(attendance::delete_attendance)),
                    )
                    // /attendance/{id}/ot/...
                    .service(
                        web::resource("/{id}/ot/request")
                            .route(web::put().to(attendance::ot_request)),
                    )
                    .service(
                        web::resource("/{id}/ot/approve")
                            .route(web::put().to(attendance::ot_approve)),
                    )
                    .service(
                        web::resource("/{id}/ot/reject")
                            .route(web::put().to(attendance::ot_reject)),
                    ),
            )
            .service(
                web::scope("/members")
                    // /members/{id}/images
                    .service(
                        web::resource("/{id}/images")
                            .route(web::post().to(enrollment::enroll_image)),
                    )
                    // /members/{id}/images/{image_id}
                    .service(
                        web::resource("/{id}/images/{image_id}")
                            .route(web::delete().to(enrollment::remove_image)),
                    ),
            )
            .service(
                web::scope("/kiosks")
                    // /kiosks/{id}/token
                    .service(
                        web::resource("/{id}/token").route(web::post().to(kiosk::issue_token)),
                    ),
            ),
    );
}

// KIOSK SCAN
//  ├─ device token gate
//  ├─ duplicate-scan guard (5 min)
//  ├─ shift resolution + check-in window
//  ├─ geofence
//  └─ face verify → scan row (pending)

// COMPUTATION (per shift, at computation_time)
//  └─ pair pending scans → attendance rollup
//       └─ late / early / overtime minutes
