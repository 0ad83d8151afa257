use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_user(&self, id: UserId) -> Result<User, EngineError> {
        self.store
            .get_user(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.store
            .get_booking(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn get_tutor_profile(&self, user_id: UserId) -> Result<TutorProfile, EngineError> {
        self.require_tutor(user_id).await
    }

    pub async fn get_student_profile(
        &self,
        user_id: UserId,
    ) -> Result<StudentProfile, EngineError> {
        self.store
            .get_student_profile(user_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("student profile {user_id}")))
    }

    /// All of a tutor's bookings, every status, ordered by start time.
    /// The terminal ones stay forever: that history is the audit trail.
    pub async fn bookings_for_tutor(&self, tutor_id: UserId) -> Result<Vec<Booking>, EngineError> {
        self.require_tutor(tutor_id).await?;
        Ok(self.store.bookings_for_tutor(tutor_id).await)
    }

    pub async fn bookings_for_student(
        &self,
        student_id: UserId,
    ) -> Result<Vec<Booking>, EngineError> {
        self.store
            .get_user(student_id)
            .await
            .ok_or_else(|| EngineError::NotFound(student_id.to_string()))?;
        Ok(self.store.bookings_for_student(student_id).await)
    }
}
