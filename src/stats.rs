//! Estadísticas de la API: estado, contador de consultas y latencia media
//! sobre una ventana móvil de las últimas muestras.

use std::collections::VecDeque;

use serde::Serialize;

use crate::models::now_timestamp;

/// Número de latencias retenidas para calcular la media.
pub const RESPONSE_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApiStatus {
    Online,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiStats {
    pub status: ApiStatus,
    pub total_queries: u64,
    pub response_times: VecDeque<f64>,
    /// Media de `response_times` (ventana actual, no global), redondeada a 2 decimales.
    pub avg_response_time: f64,
    pub last_check: String,
}

impl Default for ApiStats {
    fn default() -> Self {
        Self {
            status: ApiStatus::Online,
            total_queries: 0,
            response_times: VecDeque::with_capacity(RESPONSE_WINDOW),
            avg_response_time: 0.0,
            last_check: now_timestamp(),
        }
    }
}

impl ApiStats {
    /// Registra una consulta, haya fallado o no.
    pub fn record(&mut self, response_time_ms: f64) {
        self.total_queries += 1;
        self.response_times.push_back(response_time_ms);
        while self.response_times.len() > RESPONSE_WINDOW {
            self.response_times.pop_front();
        }

        let sum: f64 = self.response_times.iter().sum();
        self.avg_response_time = round2(sum / self.response_times.len() as f64);
        self.last_check = now_timestamp();
    }

    /// Solo pasa a `Degraded`; la vuelta a `Online` es cosa del health check.
    pub fn mark_degraded(&mut self) {
        self.status = ApiStatus::Degraded;
    }

    pub fn set_status(&mut self, status: ApiStatus) {
        self.status = status;
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
