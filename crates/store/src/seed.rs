//! Default catalog seeding for a fresh database.

use intervet_core::{Document, RagCorpus, Result, Role, Scenario, SqlScenarioDef};
use tracing::info;

use crate::SqliteStore;

/// Seed a demo role, scenario, RAG corpus, and SQL sandbox definition.
///
/// No-op when the catalog already has roles, so it is safe to call on every
/// startup.
pub async fn seed_defaults(store: &SqliteStore) -> Result<()> {
    if !store.list_roles().await?.is_empty() {
        return Ok(());
    }

    let role = store
        .create_role(Role {
            id: 0,
            name: "Data Scientist".into(),
            slug: "data-scientist".into(),
            description: Some("Классическое ML, метрики, SQL".into()),
        })
        .await?;

    let corpus = store
        .create_corpus(RagCorpus {
            id: 0,
            name: "ML basics".into(),
            description: Some("Справочные материалы по классическому ML".into()),
        })
        .await?;

    let documents = [
        (
            "regularization.md",
            "Регуляризация ограничивает сложность модели. L1 (lasso) зануляет \
             часть весов и делает отбор признаков, L2 (ridge) равномерно \
             уменьшает веса. Коэффициент регуляризации подбирается по \
             валидационной выборке.",
        ),
        (
            "classification_metrics.md",
            "Precision показывает долю верных срабатываний среди всех \
             положительных предсказаний, recall показывает полноту. F1 \
             объединяет их через гармоническое среднее. ROC-AUC оценивает \
             качество ранжирования и не зависит от порога.",
        ),
        (
            "overfitting.md",
            "Переобучение проявляется как разрыв между качеством на обучении \
             и на отложенной выборке. Помогают регуляризация, ранняя \
             остановка, увеличение данных и упрощение модели.",
        ),
    ];
    for (filename, content) in documents {
        store
            .add_document(Document {
                id: 0,
                rag_corpus_id: corpus.id,
                filename: filename.into(),
                content: content.into(),
                metadata: None,
            })
            .await?;
    }

    let sql_def = store
        .create_sql_scenario(SqlScenarioDef {
            id: 0,
            name: "ecommerce_basic".into(),
            description: Some("Заказы и покупатели интернет-магазина".into()),
            db_schema: Some(
                "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, city TEXT);\n\
                 CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, \
                 amount REAL, created_at TEXT);"
                    .into(),
            ),
            reference_solutions: Some(serde_json::json!({
                "SQL1": "SELECT c.city, SUM(o.amount) AS total \
                         FROM orders o JOIN customers c ON c.id = o.customer_id \
                         GROUP BY c.city ORDER BY total DESC"
            })),
        })
        .await?;

    let tasks = Scenario::parse_tasks(&serde_json::json!([
        {
            "id": "T1",
            "type": "theory",
            "title": "Регуляризация",
            "description": "Объясните, зачем нужна регуляризация и чем L1 отличается от L2.",
            "max_points": 5,
            "hints_allowed": true,
            "related_topics": ["regularization", "linear_models"]
        },
        {
            "id": "T2",
            "type": "theory",
            "title": "Метрики классификации",
            "description": "Когда precision важнее recall? Приведите пример.",
            "max_points": 5,
            "hints_allowed": true,
            "related_topics": ["metrics"]
        },
        {
            "id": "C1",
            "type": "coding",
            "title": "Логистическая регрессия",
            "description": "Реализуйте обучение логистической регрессии градиентным спуском.",
            "max_points": 10,
            "language": "python",
            "tests_id": "logreg_basic",
            "related_topics": ["linear_models", "optimization"]
        },
        {
            "id": "SQL1",
            "type": "sql",
            "title": "Выручка по городам",
            "description": "Посчитайте суммарную выручку по городам покупателей.",
            "max_points": 8,
            "sql_scenario_id": "ecommerce_basic",
            "related_topics": ["joins", "aggregation"]
        }
    ]))?;

    store
        .create_scenario(Scenario {
            id: 0,
            role_id: role.id,
            name: "Junior Data Scientist".into(),
            slug: "junior-ds".into(),
            description: Some("Базовое интервью: теория ML, код и SQL".into()),
            difficulty: Some("junior".into()),
            tasks,
            rag_corpus_id: Some(corpus.id),
            sql_scenario_id: Some(sql_def.id),
            config: None,
        })
        .await?;

    info!("seeded default catalog");
    Ok(())
}
