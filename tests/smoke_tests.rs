/// Smoke run against a live server.
///
/// Reads `HMS_BASE_URL` (default `http://localhost:5000/api/v1`),
/// `HMS_EMAIL`/`HMS_PASSWORD` for an admin account and `HMS_SESSION_FILE`
/// (default `.hms-session.json`). A saved session is reused until the server
/// rejects it.
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};

use hms_smoke_tests::{ApiClient, ClientError, SessionContext};

#[derive(Debug, Default)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub failures: Vec<String>,
}

impl TestResults {
    pub fn pass(&mut self, test_name: &str) {
        self.passed += 1;
        println!("✅ {}", test_name);
    }

    pub fn fail(&mut self, test_name: &str, error: &str) {
        self.failed += 1;
        self.failures.push(format!("{}: {}", test_name, error));
        println!("❌ {}: {}", test_name, error);
    }

    pub fn skip(&mut self, test_name: &str, reason: &str) {
        self.skipped += 1;
        println!("⚠️ {} (skipped: {})", test_name, reason);
    }

    /// Records the outcome and hands back the value on success.
    pub fn check<T>(&mut self, test_name: &str, outcome: Result<T, ClientError>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.pass(test_name);
                Some(value)
            }
            Err(e) => {
                self.fail(test_name, &e.to_string());
                None
            }
        }
    }

    pub fn summary(&self) {
        println!("\n📊 Smoke Summary:");
        println!("✅ Passed: {}", self.passed);
        println!("❌ Failed: {}", self.failed);
        println!("⚠️ Skipped: {}", self.skipped);

        if !self.failures.is_empty() {
            println!("\n🔍 Failures:");
            for failure in &self.failures {
                println!("  - {}", failure);
            }
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn id_of(value: &Value) -> Option<String> {
    value["id"].as_str().map(str::to_string)
}

async fn sign_in(
    client: &ApiClient,
    session_file: &Path,
    results: &mut TestResults,
) -> Option<SessionContext> {
    if let Ok(Some(saved)) = SessionContext::load(session_file) {
        match client.me(&saved).await {
            Ok(_) => {
                results.pass("Reuse saved session");
                return Some(saved);
            }
            Err(e) if e.status() == Some(401) => {
                println!("Saved session rejected, signing in again");
                let _ = SessionContext::clear(session_file);
            }
            Err(e) => {
                results.fail("Reuse saved session", &e.to_string());
                return None;
            }
        }
    }

    let credentials = (std::env::var("HMS_EMAIL"), std::env::var("HMS_PASSWORD"));
    let (Ok(email), Ok(password)) = credentials else {
        results.skip("Login", "HMS_EMAIL/HMS_PASSWORD not set");
        return None;
    };
    let session = results.check("Login", client.login(&email, &password).await)?;
    if let Err(e) = session.save(session_file) {
        println!("Could not save session: {}", e);
    }
    Some(session)
}

pub async fn run_smoke_tests(client: &ApiClient, session_file: &Path) -> TestResults {
    let mut results = TestResults::default();

    println!("🚀 Starting Hospital Management API smoke run");
    println!("📍 Base URL: {}", client.base_url());

    println!("\n🩺 Health");
    if let Some(health) = results.check("Health check", client.health().await) {
        println!("   database: {}, timezone: {}", health.data["database"], health.data["timezone"]);
    }

    println!("\n🔐 Authentication");
    match client.call(Method::GET, "/patients", None, None).await {
        Ok((status, envelope)) if status.as_u16() == 401 && !envelope.success => {
            results.pass("Protected route without token")
        }
        Ok((status, _)) => {
            results.fail("Protected route without token", &format!("Status: {}", status))
        }
        Err(e) => results.fail("Protected route without token", &e.to_string()),
    }
    let Some(session) = sign_in(client, session_file, &mut results).await else {
        return results;
    };
    let auth = Some(&session);

    println!("\n👥 Patients");
    let patient = results.check(
        "Register patient",
        client
            .post(
                "/patients",
                auth,
                json!({
                    "firstName": "Smoke",
                    "lastName": format!("Patient {}", Utc::now().timestamp()),
                    "dateOfBirth": "1990-04-12",
                    "gender": "female",
                    "phone": "+1 555 0100",
                }),
            )
            .await,
    );
    results.check("List patients", client.get("/patients?limit=5", auth).await);
    let patient_id = patient.as_ref().and_then(|p| id_of(&p.data));

    println!("\n📅 Appointments");
    let doctor_id = results
        .check("List doctors", client.get("/doctors", auth).await)
        .and_then(|d| d.data.as_array().and_then(|list| list.first()).and_then(id_of));
    let appointment_id = match (&patient_id, &doctor_id) {
        (Some(patient_id), Some(doctor_id)) => {
            let day = (Utc::now() + Duration::days(30)).format("%Y-%m-%d").to_string();
            let minute = Utc::now().timestamp() % 60;
            results
                .check(
                    "Book appointment",
                    client
                        .post(
                            "/appointments",
                            auth,
                            json!({
                                "patientId": patient_id,
                                "doctorId": doctor_id,
                                "appointmentDate": day,
                                "appointmentTime": format!("03:{:02}", minute),
                                "durationMinutes": 1,
                                "reason": "Smoke test",
                            }),
                        )
                        .await,
                )
                .and_then(|a| id_of(&a.data))
        }
        _ => {
            results.skip("Book appointment", "no patient or no active doctor");
            None
        }
    };
    if let Some(id) = &appointment_id {
        results.check(
            "Cancel appointment",
            client
                .patch(
                    &format!("/appointments/{}/status", id),
                    auth,
                    json!({ "status": "cancelled" }),
                )
                .await,
        );
    }

    println!("\n💳 Billing");
    if let Some(patient_id) = &patient_id {
        let invoice = results.check(
            "Create invoice",
            client
                .post(
                    "/invoices",
                    auth,
                    json!({
                        "patientId": patient_id,
                        "items": [
                            { "description": "Consultation", "quantity": 1, "unitPrice": 80.0 }
                        ],
                        "tax": 8.0,
                    }),
                )
                .await,
        );
        if let Some(invoice_id) = invoice.as_ref().and_then(|i| id_of(&i.data)) {
            results.check(
                "Record payment",
                client
                    .post(
                        &format!("/invoices/{}/payments", invoice_id),
                        auth,
                        json!({ "amount": 88.0, "paymentMethod": "cash" }),
                    )
                    .await,
            );
        }
    } else {
        results.skip("Create invoice", "no patient");
    }

    println!("\n📈 Dashboard");
    results.check("Dashboard stats", client.get("/dashboard/stats", auth).await);
    if session.is_admin() {
        results.check("Revenue report", client.get("/reports/revenue?groupBy=month", auth).await);
    } else {
        results.skip("Revenue report", "requires admin");
    }

    results
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = ApiClient::new(&env_or("HMS_BASE_URL", "http://localhost:5000/api/v1"));
    let session_file = PathBuf::from(env_or("HMS_SESSION_FILE", ".hms-session.json"));

    let results = run_smoke_tests(&client, &session_file).await;
    results.summary();

    if results.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
